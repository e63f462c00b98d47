//! `.context()` support for the per-crate error enums.

/// Error types buildable from a bare message; required by [`impl_context!`].
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Join a context label and its cause the way every crate reports them.
#[must_use]
pub fn with_cause(context: &str, cause: &dyn std::fmt::Display) -> String {
    format!("{context}: {cause}")
}

/// Define a `Context` extension trait for `Result` and `Option` that turns
/// failures into the calling crate's `Error` via [`FromMessage`].
///
/// The invoking module must have `Error` and `Result<T>` in scope:
///
/// ```ignore
/// pub type Result<T> = std::result::Result<T, Error>;
/// ferry_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T>;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.with_context(|| context)
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.map_err(|cause| {
                    let label: String = f().into();
                    <Error as $crate::FromMessage>::from_message($crate::error::with_cause(
                        &label, &cause,
                    ))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.with_context(|| context)
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    mod scratch {
        #[derive(Debug)]
        pub struct Error(pub String);

        impl crate::FromMessage for Error {
            fn from_message(message: String) -> Self {
                Self(message)
            }
        }

        pub type Result<T> = std::result::Result<T, Error>;

        crate::impl_context!();
    }

    use scratch::Context;

    #[test]
    fn result_context_keeps_the_cause() {
        let err = "x1"
            .parse::<i64>()
            .context("source_chat_id")
            .unwrap_err();
        assert!(err.0.starts_with("source_chat_id: "), "{}", err.0);
    }

    #[test]
    fn option_context_is_the_whole_message() {
        let err = None::<u8>.with_context(|| "no destination channel").unwrap_err();
        assert_eq!(err.0, "no destination channel");
    }

    #[test]
    fn with_cause_formats_label_first() {
        assert_eq!(super::with_cause("open db", &"locked"), "open db: locked");
    }
}
