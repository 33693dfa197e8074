use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Typed index into a backend-owned resource table.
pub struct Handle<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

// Manual impls so `T` itself needs none of these traits.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = std::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "Handle<{short}>({})", self.index)
    }
}

impl<T> Handle<T> {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Slot table behind the handles. Removed slots are never reused, so a stale handle
/// resolves to `None` instead of aliasing a newer resource.
pub struct ResourcePool<T> {
    items: Vec<Option<T>>,
    live: usize,
}

impl<T> ResourcePool<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            live: 0,
        }
    }

    pub fn insert<H>(&mut self, item: T) -> Handle<H> {
        let index = self.items.len();
        self.items.push(Some(item));
        self.live += 1;
        Handle::new(index)
    }

    pub fn get<H>(&self, handle: Handle<H>) -> Option<&T> {
        self.items.get(handle.index()).and_then(Option::as_ref)
    }

    pub fn get_mut<H>(&mut self, handle: Handle<H>) -> Option<&mut T> {
        self.items.get_mut(handle.index()).and_then(Option::as_mut)
    }

    pub fn remove<H>(&mut self, handle: Handle<H>) -> Option<T> {
        let removed = self.items.get_mut(handle.index()).and_then(Option::take);
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl<T> Default for ResourcePool<T> {
    fn default() -> Self {
        Self::new()
    }
}
