/*
 * lib.rs - PIP-OS boot library
 *
 * Everything the kernel image needs short of the entry point: board
 * selection, drivers, logging. Built no_std for the board and with std for
 * host tests.
 */

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod drivers;
pub mod hardwareselect;
pub mod logger;
pub mod utils;
