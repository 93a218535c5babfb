//! A label-free quantification (LFQ) engine for bottom-up proteomics.
//!
//! Given a set of per-run MS/MS identifications and raw MS1 data, this crate
//! builds extracted ion chromatograms around each identification's
//! theoretical isotope envelope, cuts chromatographic peaks at
//! co-eluting-peptide boundaries, and (optionally) transfers peak detections
//! across runs via match-between-runs, scored and FDR-controlled against a
//! double-decoy population. [`engine::quantify`] is the entry point; see its
//! documentation for the full per-run/cross-run pipeline.

#![allow(dead_code)]

pub mod chromatographic_peak;
pub mod config;
pub mod element;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod fdr;
pub mod formula;
pub mod identification;
pub mod isotope;
pub mod mbr_orchestrator;
pub mod mbr_scorer;
pub mod ms2_quant;
pub mod peak;
pub mod peak_cutter;
pub mod peak_index;
pub mod pep_classifier;
pub mod rand_source;
pub mod rt_align;
pub mod system;
pub mod tolerance;
pub mod xic;

pub use config::EngineParameters;
pub use engine::{quantify, QuantifyOutput, RunInput, RunMs1Data, RunResult};
pub use error::{Diagnostics, EngineError, RunWarning};
