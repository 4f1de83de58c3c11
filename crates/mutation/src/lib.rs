//! Generation of reentrancy-vulnerable mutant contracts.
//!
//! [`templates`] holds the fixed five-variant catalogue of vulnerable-function
//! fragments, parameterized by an accounting target. [`assembler`] merges one
//! fragment into a source model at a safe insertion point, renames the
//! contract, and checks the result's integrity before anything is written.

pub mod assembler;
pub mod templates;

pub use assembler::{AssemblyError, MutantContract, MutationAssembler};
pub use templates::{MutationTemplate, TemplateId, VariantGenerator, CATALOGUE_SIZE};
