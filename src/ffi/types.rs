//! Capability Types
//!
//! A capability is a named bundle of native functionality. Its payload is
//! type-erased; consumers downcast to the concrete type they expect.

use std::any::Any;
use std::cell::RefCell;
use std::ffi::c_void;
use std::fmt;
use std::rc::Rc;

use super::loader::LibraryHandle;

/// Type-erased capability payload.
pub type CapabilityObject = Rc<dyn Any>;

/// Where a capability came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    /// Compiled into the host
    Embedded,
    /// Opened from a shared library
    Dynamic,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Embedded => write!(f, "module"),
            CapabilityKind::Dynamic => write!(f, "module-external"),
        }
    }
}

/// A loaded capability.
///
/// For dynamic capabilities the library handle is owned here and released
/// exactly once, by [`close`](Capability::close) or on drop, whichever
/// comes first. The payload is always dropped before the handle, since its
/// vtable and drop glue live in the library.
pub struct Capability {
    name: String,
    kind: CapabilityKind,
    // Declared before `handle` so the payload is dropped while the code
    // backing it is still mapped.
    object: RefCell<Option<CapabilityObject>>,
    handle: RefCell<Option<Box<dyn LibraryHandle>>>,
}

impl Capability {
    pub fn embedded(name: impl Into<String>, object: CapabilityObject) -> Self {
        Self {
            name: name.into(),
            kind: CapabilityKind::Embedded,
            object: RefCell::new(Some(object)),
            handle: RefCell::new(None),
        }
    }

    pub fn dynamic(
        name: impl Into<String>,
        object: CapabilityObject,
        handle: Box<dyn LibraryHandle>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: CapabilityKind::Dynamic,
            object: RefCell::new(Some(object)),
            handle: RefCell::new(Some(handle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    /// The payload, or `None` once the capability has been closed.
    pub fn object(&self) -> Option<CapabilityObject> {
        self.object.borrow().clone()
    }

    /// Downcast the payload to a concrete type.
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        self.object()?.downcast::<T>().ok()
    }

    /// Whether a library handle is still held.
    pub fn is_open(&self) -> bool {
        self.handle.borrow().is_some()
    }

    /// Drop the payload, then release the underlying library.
    ///
    /// Returns false without releasing anything when there is nothing to
    /// release (embedded, or already closed) or when clones of the payload
    /// are still alive elsewhere.
    ///
    /// # Safety
    ///
    /// After closing, nothing obtained from this capability's payload may be
    /// used if it refers to code or data inside the library.
    pub unsafe fn close(&self) -> bool {
        if self.handle.borrow().is_none() {
            return false;
        }
        let mut object = self.object.borrow_mut();
        if object.as_ref().map_or(false, |payload| Rc::strong_count(payload) > 1) {
            return false;
        }
        drop(object.take());
        drop(object);
        self.handle.borrow_mut().take().is_some()
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Hand a capability payload across the library boundary.
///
/// A capability library built against this crate implements its
/// registration symbol like this:
///
/// ```ignore
/// #[no_mangle]
/// pub extern "C" fn _register_zlib() -> *mut std::ffi::c_void {
///     ember::ffi::export_capability(std::rc::Rc::new(Zlib::default()))
/// }
/// ```
pub fn export_capability(object: CapabilityObject) -> *mut c_void {
    Box::into_raw(Box::new(object)).cast()
}

/// Take back a payload produced by [`export_capability`].
///
/// # Safety
///
/// `ptr` must be non-null and come from `export_capability`, and must not
/// be taken twice.
pub(crate) unsafe fn take_capability(ptr: *mut c_void) -> CapabilityObject {
    *Box::from_raw(ptr.cast::<CapabilityObject>())
}
