//! Silicon model for the Life accelerator design.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the programmable-logic design: the address map, the AXI DMA
//! and AXI GPIO register layouts, and the cellular-automaton rule the
//! accelerator implements.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`map`] | Base addresses, receive buffer placement, block size |
//! | [`regs`] | AXI DMA (simple mode) and AXI GPIO register offsets and bits |
//! | [`grid`] | 8×8 grid geometry, state split/join, reference Life step |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod grid;
pub mod map;
pub mod regs;
