//! Global tuning knobs that can be overridden from environment variables.
//!
//! An [`EnvParam`] couples the name of an environment variable, the textual default it falls back
//! to and a one-line description. The value is parsed lazily on first access and frozen afterwards,
//! which makes it suitable for `static` items consulted from hot loops.
//!
//! ```
//! use env_param::EnvParam;
//! static BEAM_WIDTH: EnvParam<usize> = EnvParam::new("DOC_BEAM_WIDTH", "40", "width of the beam");
//!
//! fn main() {
//!   // environment variable not set, the default is parsed
//!   assert_eq!(BEAM_WIDTH.get(), 40);
//! }
//! ```
//!
//! A variable set before the first access takes precedence over the default:
//!
//! ```
//! use env_param::EnvParam;
//! static GAIN: EnvParam<f64> = EnvParam::new("DOC_GAIN", "0.05", "minimum gain");
//!
//! fn main() {
//!   std::env::set_var("DOC_GAIN", "0.25");
//!   assert_eq!(GAIN.get(), 0.25);
//! }
//! ```
//!
//! Once read, a parameter never changes. [`EnvParam::set`] forces a value programmatically
//! and fails if the parameter was already initialized.
//!
//! ```
//! use env_param::EnvParam;
//! static CAP: EnvParam<u32> = EnvParam::new("DOC_CAP", "200", "iteration cap");
//!
//! fn main() {
//!   assert!(CAP.set(10).is_ok());
//!   assert_eq!(CAP.get(), 10);
//!   assert!(CAP.set(999).is_err());
//!   assert_eq!(CAP.get(), 10);
//! }
//! ```

use once_cell::sync::OnceCell;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

pub struct EnvParam<T> {
    value: OnceCell<T>,
    var: &'static str,
    default: &'static str,
    doc: &'static str,
}

/// Returned by [`EnvParam::set`] when the parameter was already read or set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyInitialized(pub &'static str);

impl Display for AlreadyInitialized {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "parameter {} is already initialized", self.0)
    }
}

impl std::error::Error for AlreadyInitialized {}

impl<T> EnvParam<T> {
    pub const fn new(var: &'static str, default: &'static str, doc: &'static str) -> EnvParam<T> {
        EnvParam {
            value: OnceCell::new(),
            var,
            default,
            doc,
        }
    }

    /// Name of the environment variable backing this parameter.
    pub fn var(&self) -> &'static str {
        self.var
    }

    pub fn default_str(&self) -> &'static str {
        self.default
    }

    pub fn doc(&self) -> &'static str {
        self.doc
    }

    pub fn is_initialized(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T: FromStr> EnvParam<T> {
    fn parse_default(&self) -> T {
        match self.default.parse::<T>() {
            Ok(v) => v,
            // a broken default is a programming error in the declaration of the static
            Err(_) => panic!("[env_param] {}: invalid default value \"{}\"", self.var, self.default),
        }
    }

    fn read(&self) -> T {
        match std::env::var(self.var) {
            Ok(raw) => match raw.trim().parse::<T>() {
                Ok(v) => v,
                Err(_) => {
                    tracing::warn!(
                        var = self.var,
                        value = %raw,
                        default = self.default,
                        "unparsable environment value, using default"
                    );
                    self.parse_default()
                }
            },
            Err(std::env::VarError::NotPresent) => self.parse_default(),
            Err(err) => {
                tracing::warn!(var = self.var, %err, default = self.default, "unreadable environment value");
                self.parse_default()
            }
        }
    }

    /// Current value of the parameter, reading the environment on first access.
    ///
    /// # Panic
    /// Panics if the declared default cannot be parsed into `T`.
    pub fn get(&self) -> T
    where
        T: Copy,
    {
        *self.get_ref()
    }

    /// Reference to the current value, reading the environment on first access.
    pub fn get_ref(&self) -> &T {
        self.value.get_or_init(|| self.read())
    }

    /// Forces the value of a parameter that has not been accessed yet.
    pub fn set(&self, value: T) -> Result<(), AlreadyInitialized> {
        self.value.set(value).map_err(|_| AlreadyInitialized(self.var))
    }
}

impl<T: FromStr + Debug> Debug for EnvParam<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={:?}", self.var, self.get_ref())
    }
}

/// Object-safe view over a parameter, used to list every tunable of a crate regardless of its type.
pub trait Describe: Sync {
    fn var(&self) -> &'static str;
    fn doc(&self) -> &'static str;
    fn current(&self) -> String;
}

impl<T: FromStr + Display + Send + Sync> Describe for EnvParam<T> {
    fn var(&self) -> &'static str {
        self.var
    }

    fn doc(&self) -> &'static str {
        self.doc
    }

    fn current(&self) -> String {
        self.get_ref().to_string()
    }
}
