//! In-memory resource index, partitioned into idle and inuse.
//!
//! Not thread-safe on its own — every access is serialized through the
//! pool's single mutex so that "check size, then mutate" reads as one
//! atomic decision from a caller's perspective.

use indexmap::IndexMap;

use crate::initializer::ResourceHolder;
use crate::resource::PoolResource;

pub(crate) struct Registry<R: PoolResource + Clone> {
    idle: IndexMap<String, R>,
    inuse: IndexMap<String, R>,
}

impl<R: PoolResource + Clone> Registry<R> {
    pub fn new() -> Self {
        Self {
            idle: IndexMap::new(),
            inuse: IndexMap::new(),
        }
    }

    pub fn add_idle(&mut self, resource: R) {
        self.idle.insert(resource.id().to_string(), resource);
    }

    pub fn add_inuse(&mut self, resource: R) {
        self.inuse.insert(resource.id().to_string(), resource);
    }

    pub fn take_idle_any(&mut self) -> Option<R> {
        self.idle.shift_remove_index(0).map(|(_, r)| r)
    }

    pub fn take_idle_by_id(&mut self, id: &str) -> Option<R> {
        self.idle.shift_remove(id)
    }

    pub fn take_inuse_by_id(&mut self, id: &str) -> Option<R> {
        self.inuse.shift_remove(id)
    }

    pub fn take_inuse_any(&mut self) -> Option<R> {
        self.inuse.shift_remove_index(0).map(|(_, r)| r)
    }

    pub fn contains_inuse(&self, id: &str) -> bool {
        self.inuse.contains_key(id)
    }

    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub fn inuse_len(&self) -> usize {
        self.inuse.len()
    }

    pub fn sizes(&self) -> (usize, usize) {
        (self.idle.len(), self.inuse.len())
    }

    /// Drop inuse bookkeeping without disposing — the caller still holds
    /// the actual resources and is responsible for them (see `Pool::close`).
    pub fn clear_inuse(&mut self) {
        self.inuse.clear();
    }

    pub fn drain_idle(&mut self) -> Vec<R> {
        std::mem::take(&mut self.idle).into_values().collect()
    }
}

pub(crate) struct InitHolder<'a, R: PoolResource + Clone> {
    pub registry: &'a mut Registry<R>,
}

impl<R: PoolResource + Clone> ResourceHolder<R> for InitHolder<'_, R> {
    fn add_idle(&mut self, resource: R) {
        self.registry.add_idle(resource);
    }

    fn add_inuse(&mut self, resource: R) {
        self.registry.add_inuse(resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Dummy(&'static str);

    impl PoolResource for Dummy {
        fn id(&self) -> &str {
            self.0
        }

        fn kind(&self) -> &str {
            "dummy"
        }
    }

    #[test]
    fn take_idle_any_is_oldest_first() {
        let mut reg = Registry::new();
        reg.add_idle(Dummy("a"));
        reg.add_idle(Dummy("b"));
        assert_eq!(reg.take_idle_any().unwrap().id(), "a");
        assert_eq!(reg.take_idle_any().unwrap().id(), "b");
        assert!(reg.take_idle_any().is_none());
    }

    #[test]
    fn take_idle_by_id_misses_on_unknown() {
        let mut reg = Registry::new();
        reg.add_idle(Dummy("a"));
        assert!(reg.take_idle_by_id("missing").is_none());
        assert_eq!(reg.take_idle_by_id("a").unwrap().id(), "a");
    }

    #[test]
    fn sizes_reflect_both_partitions() {
        let mut reg = Registry::new();
        reg.add_idle(Dummy("a"));
        reg.add_inuse(Dummy("b"));
        assert_eq!(reg.sizes(), (1, 1));
    }
}
