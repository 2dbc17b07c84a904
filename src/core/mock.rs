//! Binding test callables into a realized unit.
//!
//! A mock is a plain `extern "C" fn` with the same shape as the registered
//! extern. Attaching stores it in the unit's slot for that extern, so calls
//! from the code under test land in the mock. The returned handle is the
//! unit's own exported definition of the extern, so test code can drive the
//! binding the same way the code under test does.

use std::sync::Arc;

use super::build_state::{BuildState, LoadedOf};
use crate::builder::{Builder, ExternSignature, LoadedUnit, RawSymbol};
use crate::error::{HarnessError, Result};

/// A C-callable function usable as a mock.
pub trait MockFn: Copy + Send + Sync + 'static {
    /// Number of parameters.
    const ARITY: usize;

    /// Address of the function.
    fn into_raw(self) -> RawSymbol;

    /// Reinterpret an address as this function type.
    ///
    /// # Safety
    ///
    /// `raw` must point to a function with exactly this signature and calling
    /// convention, and must stay valid for as long as the result is used.
    unsafe fn from_raw(raw: RawSymbol) -> Self;
}

macro_rules! impl_mock_fn {
    ($arity:expr; $($arg:ident),*) => {
        impl<R: 'static, $($arg: 'static),*> MockFn for extern "C" fn($($arg),*) -> R {
            const ARITY: usize = $arity;

            fn into_raw(self) -> RawSymbol {
                self as RawSymbol
            }

            unsafe fn from_raw(raw: RawSymbol) -> Self {
                std::mem::transmute_copy::<RawSymbol, Self>(&raw)
            }
        }
    };
}

impl_mock_fn!(0;);
impl_mock_fn!(1; A1);
impl_mock_fn!(2; A1, A2);
impl_mock_fn!(3; A1, A2, A3);
impl_mock_fn!(4; A1, A2, A3, A4);
impl_mock_fn!(5; A1, A2, A3, A4, A5);
impl_mock_fn!(6; A1, A2, A3, A4, A5, A6);

/// Find the registered extern called `name`.
pub fn declared_extern(unit: &str, externs: &[String], name: &str) -> Result<ExternSignature> {
    for declaration in externs {
        let signature = ExternSignature::parse(declaration)?;
        if signature.name == name {
            return Ok(signature);
        }
    }
    Err(HarnessError::BindingNotFound {
        unit: unit.to_string(),
        name: name.to_string(),
    })
}

/// A bound extern: the unit's exported definition of the extern, plus the
/// loaded unit it lives in.
///
/// Holding the unit keeps the library mapped, so the function stays callable
/// after the class is reset or torn down. Call it through deref:
/// `(*read_adc)(2)` or `read_adc.get()(2)`. A pointer copied out of the
/// handle is only valid while the handle is alive.
pub struct Attached<F: MockFn, L> {
    function: F,
    sut: Arc<L>,
}

impl<F: MockFn, L> Attached<F, L> {
    /// Pair `function` with the unit that owns its code.
    ///
    /// # Safety
    ///
    /// `function` must point into `sut` (or into code that lives at least
    /// as long).
    pub unsafe fn new(function: F, sut: Arc<L>) -> Self {
        Attached { function, sut }
    }

    /// The function pointer. Only valid while `self` is alive.
    pub fn get(&self) -> F {
        self.function
    }

    /// The loaded unit kept alive by this handle.
    pub fn sut(&self) -> &Arc<L> {
        &self.sut
    }
}

impl<F: MockFn, L> std::ops::Deref for Attached<F, L> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.function
    }
}

impl<F: MockFn, L> std::fmt::Debug for Attached<F, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attached")
            .field("function", &self.function.into_raw())
            .finish_non_exhaustive()
    }
}

/// Bind `mock` to the slot of `signature` in `sut` and return the unit's
/// exported definition of the extern.
///
/// # Safety
///
/// `F` must match the C declaration in `signature`. Only the arity is
/// checked; parameter and return types are taken on trust. `mock` must stay
/// callable for as long as the unit may call it.
pub unsafe fn attach_to<L: LoadedUnit, F: MockFn>(
    sut: &Arc<L>,
    signature: &ExternSignature,
    mock: F,
) -> Result<Attached<F, L>> {
    if F::ARITY != signature.arity() {
        return Err(HarnessError::SignatureMismatch {
            name: signature.name.clone(),
            given: F::ARITY,
            declared: signature.arity(),
        });
    }

    sut.attach(&signature.name, mock.into_raw())?;
    let binding = sut.resolve(&signature.name)?;
    tracing::debug!("attached mock for `{}`", signature.name);
    Ok(Attached::new(F::from_raw(binding), Arc::clone(sut)))
}

impl<B: Builder> BuildState<B> {
    /// Realize the SUT if needed, then attach `mock` to the extern `name`.
    ///
    /// Fails with `BindingNotFound` when `name` was not registered before the
    /// build started, and with `SignatureMismatch` when the arities differ.
    /// The returned handle keeps the SUT loaded, even across [`reset`].
    ///
    /// # Safety
    ///
    /// See [`attach_to`].
    ///
    /// [`reset`]: BuildState::reset
    pub unsafe fn attach_mock<F: MockFn>(
        &mut self,
        name: &str,
        mock: F,
    ) -> Result<Attached<F, LoadedOf<B>>> {
        let sut: Arc<LoadedOf<B>> = self.ensure_sut()?;
        let signature = declared_extern(&self.origin().test_name(), self.pending_externs(), name)?;
        attach_to(&sut, &signature, mock)
    }
}
