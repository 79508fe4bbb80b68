//! Failure values and their normalization.
//!
//! Anything can be used to fail a promise: a structured [Exception] raised by
//! user code, an error object produced by the host (a panic message, an
//! [std::io::Error]), or some arbitrary value. At the host level all of these
//! travel as an opaque [Failure]. Whenever a failure is handed to user code it
//! is first normalized with [UnifiedError::classify] into one of exactly
//! three shapes, so recovery handlers only ever see a [UnifiedError].
//!
//! ```
//! use pledge::error::{Exception, Exn, Failure, HostError, UnifiedError};
//!
//! #[derive(Debug, PartialEq)]
//! struct NotFound(u32);
//! impl Exception for NotFound {}
//!
//! let domain = UnifiedError::classify(&Failure::from(NotFound(4)));
//! assert_eq!(domain.exception().unwrap().downcast_ref(), Some(&NotFound(4)));
//!
//! let host = UnifiedError::classify(&Failure::new(String::from("bad fd")));
//! assert!(matches!(host, UnifiedError::HostFailure(ref e) if e.message() == "bad fd"));
//!
//! let unknown = UnifiedError::classify(&Failure::new(42u8));
//! assert!(matches!(unknown, UnifiedError::UnknownFailure(_)));
//! ```
use std::{
    any::{self, Any},
    fmt, io,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;

/// A structured exception raised by user code.
///
/// Implement this for your own error types to have them classified as
/// [UnifiedError::DomainFailure]. The tag identifies the kind of exception and
/// defaults to the implementing type's name.
pub trait Exception: AsAny + fmt::Debug + Send + Sync + 'static {
    fn tag(&self) -> &'static str {
        any::type_name::<Self>()
    }
}

#[doc(hidden)]
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A raised [Exception], type-erased.
#[derive(Clone)]
pub struct Exn(Arc<dyn Exception>);

impl Exn {
    pub fn new<E: Exception>(e: E) -> Self {
        Self(Arc::new(e))
    }

    pub fn tag(&self) -> &'static str {
        self.0.tag()
    }

    pub fn is<E: Exception>(&self) -> bool {
        self.0.as_ref().as_any().is::<E>()
    }

    pub fn downcast_ref<E: Exception>(&self) -> Option<&E> {
        self.0.as_ref().as_any().downcast_ref()
    }
}

impl fmt::Debug for Exn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Exn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.tag(), self.0)
    }
}

/// An error object originating from the host rather than from user code.
///
/// Only the message is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&io::Error> for HostError {
    fn from(value: &io::Error) -> Self {
        Self::new(value.to_string())
    }
}

/// Any value a promise was rejected with, or a callback threw.
///
/// The value is kept verbatim; use [UnifiedError::classify] to inspect it.
/// Its shape is worked out once, when the failure is created, so classifying
/// or formatting a failure never touches the value again.
#[derive(Clone)]
pub struct Failure(Arc<Payload>);

struct Payload {
    known: Option<UnifiedError>,
    value: Value,
}

enum Value {
    Shared(Box<dyn Any + Send + Sync>),
    // A panic payload of a type we do not know to be `Sync`.
    Panic(Mutex<PanicPayload>),
}

/// The normalized shape of `value`, if it has one.
fn shape_of(value: &dyn Any) -> Option<UnifiedError> {
    if let Some(normalized) = value.downcast_ref::<UnifiedError>() {
        return Some(normalized.clone());
    }

    if let Some(exn) = value.downcast_ref::<Exn>() {
        return Some(UnifiedError::DomainFailure(exn.clone()));
    }

    let message = if let Some(e) = value.downcast_ref::<HostError>() {
        e.message.clone()
    } else if let Some(msg) = value.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = value.downcast_ref::<&'static str>() {
        (*msg).to_owned()
    } else {
        value.downcast_ref::<io::Error>()?.to_string()
    };

    Some(UnifiedError::HostFailure(HostError::new(message)))
}

type PanicPayload = Box<dyn Any + Send>;

fn rebox<V: Any + Send + Sync>(payload: PanicPayload) -> Result<Failure, PanicPayload> {
    payload.downcast::<V>().map(|v| Failure::new(*v))
}

impl Failure {
    /// Wrap an arbitrary value. Wrapping a [Failure] returns it unchanged.
    ///
    /// The value is classified by its concrete type only. A value whose type
    /// implements [Exception] is *not* recognized as one when passed here;
    /// use [Failure::from], [raise] or `reject` to get a
    /// [UnifiedError::DomainFailure].
    pub fn new<V: Any + Send + Sync>(value: V) -> Self {
        let any: &dyn Any = &value;

        if let Some(failure) = any.downcast_ref::<Failure>() {
            return failure.clone();
        }

        if let Some(UnifiedError::UnknownFailure(failure)) = any.downcast_ref::<UnifiedError>() {
            return failure.clone();
        }

        Self(Arc::new(Payload {
            known: shape_of(any),
            value: Value::Shared(Box::new(value)),
        }))
    }

    /// Wrap the payload of a caught panic.
    pub fn from_panic(payload: PanicPayload) -> Self {
        rebox::<Failure>(payload)
            .or_else(rebox::<UnifiedError>)
            .or_else(rebox::<Exn>)
            .or_else(rebox::<HostError>)
            .or_else(rebox::<String>)
            .or_else(rebox::<&'static str>)
            .or_else(rebox::<io::Error>)
            .unwrap_or_else(|opaque| {
                Self(Arc::new(Payload {
                    known: None,
                    value: Value::Panic(Mutex::new(opaque)),
                }))
            })
    }

    pub fn is<V: Any>(&self) -> bool {
        self.with(|_: &V| ()).is_some()
    }

    /// Run `f` against the wrapped value if it is a `V`.
    ///
    /// Classifying or formatting this failure from within `f` is fine. The one
    /// exception is a panic payload of an unrecognized type, which stays
    /// locked while `f` runs: calling `with` on that same failure again from
    /// inside `f` deadlocks.
    pub fn with<V: Any, R>(&self, f: impl FnOnce(&V) -> R) -> Option<R> {
        match &self.0.value {
            Value::Shared(value) => value.downcast_ref::<V>().map(f),
            Value::Panic(value) => {
                let value = value.lock().unwrap_or_else(PoisonError::into_inner);
                value.downcast_ref::<V>().map(f)
            }
        }
    }

    pub fn downcast_cloned<V: Any + Clone>(&self) -> Option<V> {
        self.with(V::clone)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.known {
            Some(UnifiedError::DomainFailure(exn)) => f.debug_tuple("Failure").field(exn).finish(),
            Some(UnifiedError::HostFailure(e)) => f.debug_tuple("Failure").field(e).finish(),
            Some(UnifiedError::UnknownFailure(_)) | None => f.write_str("Failure(<opaque>)"),
        }
    }
}

impl<E: Exception> From<E> for Failure {
    fn from(value: E) -> Self {
        Failure::new(Exn::new(value))
    }
}

impl From<Exn> for Failure {
    fn from(value: Exn) -> Self {
        Failure::new(value)
    }
}

impl From<HostError> for Failure {
    fn from(value: HostError) -> Self {
        Failure::new(value)
    }
}

impl From<UnifiedError> for Failure {
    fn from(value: UnifiedError) -> Self {
        Failure::new(value)
    }
}

/// The normalized form of every failure handed to user code.
#[derive(Debug, Clone, Error)]
pub enum UnifiedError {
    /// A structured exception raised by user code.
    #[error("{0}")]
    DomainFailure(Exn),
    /// An error object produced by the host.
    #[error("host failure: {0}")]
    HostFailure(HostError),
    /// Anything else, kept verbatim.
    #[error("unknown failure: {0:?}")]
    UnknownFailure(Failure),
}

impl UnifiedError {
    /// Classify a failure by its shape.
    ///
    /// Already-normalized errors are returned as they are, so classifying is
    /// idempotent no matter how many times a failure crosses a boundary.
    pub fn classify(failure: &Failure) -> Self {
        match &failure.0.known {
            Some(normalized) => normalized.clone(),
            None => Self::UnknownFailure(failure.clone()),
        }
    }

    pub fn exception(&self) -> Option<&Exn> {
        match self {
            Self::DomainFailure(exn) => Some(exn),
            _ => None,
        }
    }

    pub fn host_error(&self) -> Option<&HostError> {
        match self {
            Self::HostFailure(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::UnknownFailure(_))
    }
}

impl From<Failure> for UnifiedError {
    fn from(value: Failure) -> Self {
        Self::classify(&value)
    }
}

/// Throw a structured exception out of a combinator callback.
///
/// The enclosing combinator turns it into a rejection classified as
/// [UnifiedError::DomainFailure]. Unlike `panic!`, this does not invoke the
/// panic hook.
pub fn raise<E: Exception>(e: E) -> ! {
    throw(Exn::new(e))
}

/// Throw any failure out of a combinator callback, e.g. a [HostError].
///
/// Like [Failure::new], this does not recognize a bare [Exception] value: an
/// exception thrown with `throw(Failure::new(e))` or
/// [std::panic::panic_any] is an [UnifiedError::UnknownFailure]. Use [raise]
/// or pass the exception itself, which converts through [Failure::from].
pub fn throw(failure: impl Into<Failure>) -> ! {
    panic::resume_unwind(Box::new(failure.into()))
}

/// Run `f`, turning a panic unwinding out of it into a [Failure].
pub(crate) fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, Failure> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(Failure::from_panic)
}
