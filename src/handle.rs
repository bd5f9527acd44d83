//! Exclusive ownership of native driver resources.

/// Identity of a native resource. Two handles are equal iff their raw ids are equal.
pub type RawId = u64;

/// A resource owned by the native driver (connection, result set, statement).
pub trait NativeResource {
    /// Identity of the underlying resource.
    fn raw_id(&self) -> RawId;

    /// Release the resource.
    ///
    /// Called exactly once by [`NativeHandle`]. Must not fail; drivers log
    /// internally if the release itself goes wrong.
    fn release(&mut self);
}

/// Move-only owner of one native resource.
///
/// Dropping a non-empty handle releases the resource exactly once. Dropping an
/// empty handle does nothing. [`NativeHandle::take`] transfers ownership and
/// leaves the source empty.
#[derive(Debug)]
pub struct NativeHandle<R: NativeResource> {
    inner: Option<R>,
}

impl<R: NativeResource> NativeHandle<R> {
    /// Take ownership of a native resource.
    pub fn new(resource: R) -> Self {
        Self {
            inner: Some(resource),
        }
    }

    /// A handle that owns nothing.
    pub fn empty() -> Self {
        Self { inner: None }
    }

    /// Returns true if the handle owns nothing.
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Identity of the owned resource, `None` when empty.
    pub fn raw_id(&self) -> Option<RawId> {
        self.inner.as_ref().map(NativeResource::raw_id)
    }

    /// Borrow the owned resource.
    pub fn get(&self) -> Option<&R> {
        self.inner.as_ref()
    }

    /// Mutably borrow the owned resource.
    pub fn get_mut(&mut self) -> Option<&mut R> {
        self.inner.as_mut()
    }

    /// Transfer ownership to a new handle, leaving this one empty.
    pub fn take(&mut self) -> Self {
        Self {
            inner: self.inner.take(),
        }
    }

    /// Release the owned resource now. No-op on an empty handle.
    pub fn reset(&mut self) {
        if let Some(mut resource) = self.inner.take() {
            resource.release();
        }
    }
}

impl<R: NativeResource> Default for NativeHandle<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R: NativeResource> PartialEq for NativeHandle<R> {
    fn eq(&self, other: &Self) -> bool {
        self.raw_id() == other.raw_id()
    }
}

impl<R: NativeResource> Eq for NativeHandle<R> {}

impl<R: NativeResource> Drop for NativeHandle<R> {
    fn drop(&mut self) {
        self.reset();
    }
}
