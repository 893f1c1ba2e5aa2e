//! Function execution backends.
//!
//! The [`backend::ComputeService`] trait abstracts over where functions
//! are registered and run.  Implementations are a gateway to AWS Lambda
//! and an in-process registry for local runs and tests.

pub mod backend;
pub mod lambda;
pub mod memory;
