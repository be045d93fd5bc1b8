//! Process-fatal heap errors.
//!
//! Nothing in the allocation front end returns a recoverable error: either
//! the request is satisfied or the heap is left in a state no caller can
//! repair. Those states are reported through [`fatal_error`], which never
//! returns. Release builds are compiled with `panic = "abort"`, so the panic
//! takes the process down.

use crate::Generation;

use thiserror::Error;

/// Errors after which the heap cannot be used again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FatalError {
    /// A heap space could not provide the requested words.
    #[error("out of memory: cannot allocate {words} words in the {space:?} heap")]
    OutOfMemory {
        /// Space the allocation was attempted in.
        space: Generation,
        /// Words requested, header included.
        words: usize,
    },
    /// A recursive placeholder was patched with a value of another size.
    #[error("dummy size mismatch: placeholder has {dummy} fields, value has {value}")]
    DummySizeMismatch {
        /// Size of the placeholder.
        dummy: usize,
        /// Size of the computed value.
        value: usize,
    },
}

/// Report a fatal heap error and stop.
#[cold]
#[inline(never)]
#[track_caller]
pub fn fatal_error(err: FatalError) -> ! {
    log::error!("fatal heap error: {}", err);
    panic!("{}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let oom = FatalError::OutOfMemory {
            space: Generation::Major,
            words: 300,
        };
        assert_eq!(
            oom.to_string(),
            "out of memory: cannot allocate 300 words in the Major heap"
        );

        let mismatch = FatalError::DummySizeMismatch { dummy: 2, value: 3 };
        assert!(mismatch.to_string().contains("size mismatch"));
    }

    #[test]
    #[should_panic(expected = "out of memory")]
    fn test_fatal_error_panics() {
        fatal_error(FatalError::OutOfMemory {
            space: Generation::Minor,
            words: 8,
        });
    }
}
