//! # UI Module
//!
//! This module contains all UI components for the intonation trainer.

pub mod cent_meter;
pub mod main_display;
pub mod note_belt;
