//! Capability-restricted visibility, generalizing Martos's
//! `#[cfg(feature = "cooperative_tests")]`-gated test accessors into a
//! reusable zero-sized "passkey" type.
//!
//! `alterstack` grants this kind of access with `friend class X;`
//! declarations scattered across a dozen headers. Rust modules already give
//! file-level privacy, but exposing a task's raw `state` to test harnesses
//! without making it part of the normal public API needs to be callable from
//! test code in `#[cfg(feature = "testing")]` builds only. `Passkey<T>`
//! expresses that: only code that can name `T` and is allowed to construct a
//! `Passkey<T>` may call the gated method.

use core::marker::PhantomData;

/// A capability token required as an argument by methods that would
/// otherwise need a C++-style `friend` declaration. The only way to mint one
/// is [`Passkey::for_testing`], under the `testing` feature.
pub struct Passkey<T>(PhantomData<T>);

#[cfg(feature = "testing")]
impl<T> Passkey<T> {
    /// Mints a passkey for test code. Only available with the `testing`
    /// feature enabled.
    pub fn for_testing() -> Self {
        Passkey(PhantomData)
    }
}
