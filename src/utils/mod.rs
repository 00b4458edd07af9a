/*
 * utils/mod.rs - Utility Module for PIP-OS
 *
 * - locked: spin-mutex wrapper for statics shared across the boot path
 *   Used by: logger (global console)
 *
 * - poll: bounded busy-wait primitives
 *   Used by: UART and mailbox drivers to turn hangs into errors
 */

pub mod locked;
pub mod poll;
