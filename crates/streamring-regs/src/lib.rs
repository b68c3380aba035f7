// SPDX-License-Identifier: AGPL-3.0-only

//! Register and port model for the streamring DRAM packet ring writer.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure description of the two narrow contracts the gateware core exposes to
//! its collaborators: the host-visible status block, and the geometry of the
//! memory-bus write port on each supported platform.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | Status block map: offsets, status bits, per-region table |
//! | [`port`] | Write-port geometry per platform (word width, bursts, FIFO, DRAM) |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod port;
pub mod regs;
