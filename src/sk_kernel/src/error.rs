//! Kernel error codes
use core::fmt;

/// The macro to define [`KernelError`].
macro_rules! define_result_code {
    (
        $( #[$meta:meta] )*
        pub enum KernelError {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum KernelError {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl KernelError {
            /// All error codes, in declaration order.
            pub const ALL: &'static [Self] = &[$( Self::$vname ),*];

            /// Get the short name of the error code.
            ///
            /// # Examples
            ///
            /// ```
            /// use sk_kernel::KernelError;
            /// assert_eq!(KernelError::Timeout.as_str(), "Timeout");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            /// Convert a raw error code back to [`KernelError`]. Returns `None`
            /// for `0` (success) and unknown codes.
            pub fn from_code(code: i8) -> Option<Self> {
                match code {
                    $(
                        x if x == Self::$vname as i8 => Some(Self::$vname),
                    )*
                    _ => None,
                }
            }
        }
    };
}

define_result_code! {
    /// All failure codes that the kernel API can return. Success is
    /// represented by `Ok(_)`.
    ///
    /// The numeric values are stable and follow the classic small-integer
    /// taxonomy (`0` is success, failures are negative).
    ///
    /// `Full`, `Empty` and `Timeout` are routine outcomes of non-blocking or
    /// timed calls. Conditions the kernel cannot recover from (an empty ready
    /// set at scheduling time, a corrupted wait list) are invariant violations
    /// and panic instead of being reported through this type.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum KernelError {
        /// Generic failure: the object is in a state that disallows the
        /// operation, the caller is not the owner, or the wait was cut short
        /// by a forced wake-up.
        Error = -1,
        /// The operation timed out, or a non-blocking call found the resource
        /// unavailable.
        Timeout = -2,
        /// The resource is full.
        Full = -3,
        /// The resource is empty.
        Empty = -4,
        /// Memory or control block exhaustion.
        NoMemory = -5,
        /// The kernel is busy, e.g., the CPU Lock is already held by the
        /// caller.
        Busy = -6,
        /// I/O error.
        Io = -7,
        /// A parameter or handle is invalid.
        InvalidArgument = -8,
        /// The caller was parked on a wait list and the port resumed it before
        /// the wait completed. Only ports whose context switch returns
        /// immediately (such as a hosted simulator) observe this; the final
        /// outcome is published through [`Kernel::take_wait_result`].
        ///
        /// [`Kernel::take_wait_result`]: crate::Kernel::take_wait_result
        Suspended = -9,
    }
}

impl KernelError {
    /// Get the raw error code.
    #[inline]
    pub fn code(self) -> i8 {
        self as i8
    }
}

impl fmt::Debug for KernelError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            Self::Error => "generic error",
            Self::Timeout => "timed out",
            Self::Full => "resource is full",
            Self::Empty => "resource is empty",
            Self::NoMemory => "out of memory",
            Self::Busy => "kernel is busy",
            Self::Io => "I/O error",
            Self::InvalidArgument => "invalid argument",
            Self::Suspended => "caller is suspended",
        };
        f.write_str(msg)
    }
}

/// Convert a `Result` to the raw integer form used at a C-like API surface.
#[inline]
pub fn result_code<T>(x: &Result<T, KernelError>) -> i8 {
    match x {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}
