//! The promise integration bridge
//!
//! - [`suspending`]: host callables imported into wasm that may suspend
//!   their caller while a promise is pending.
//! - [`promising`]: wasm exports that run on their own continuation and
//!   return a promise of their result.
//! - [`continuation`]: the manager that owns every continuation and resumes
//!   it when the promise it waits on settles.
//! - [`function`]: the low-level `WebAssembly.Function` forms, where the
//!   suspend context is an explicit first parameter.

pub mod continuation;
pub mod function;
pub mod promising;
pub mod suspending;

pub use continuation::{Continuation, ContinuationId, ContinuationManager, ContinuationState};
pub use function::{wrap, FunctionOptions, Position, TypedFunction};
pub use promising::{promising, PromisingFunction};
pub use suspending::{HostImport, SuspendMode, Suspending};
