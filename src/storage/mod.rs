//! Blob storage backends.
//!
//! The [`backend::BlobStore`] trait abstracts over where datasets and
//! pages physically live.  Implementations are a gateway to AWS S3 and an
//! in-memory store for local runs and tests.

pub mod aws;
pub mod backend;
pub mod memory;
