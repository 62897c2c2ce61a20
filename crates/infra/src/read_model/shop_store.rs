use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::RwLock;

use khata_core::ShopId;

/// Shop-isolated key/value store abstraction for disposable read models.
pub trait ShopStore<K, V>: Send + Sync {
    fn get(&self, shop_id: ShopId, key: &K) -> Option<V>;
    fn upsert(&self, shop_id: ShopId, key: K, value: V);
    fn list(&self, shop_id: ShopId) -> Vec<V>;
    /// Clear all read-model records for a shop (rebuild support).
    fn clear_shop(&self, shop_id: ShopId);
}

impl<K, V, S> ShopStore<K, V> for Arc<S>
where
    S: ShopStore<K, V> + ?Sized,
{
    fn get(&self, shop_id: ShopId, key: &K) -> Option<V> {
        (**self).get(shop_id, key)
    }

    fn upsert(&self, shop_id: ShopId, key: K, value: V) {
        (**self).upsert(shop_id, key, value)
    }

    fn list(&self, shop_id: ShopId) -> Vec<V> {
        (**self).list(shop_id)
    }

    fn clear_shop(&self, shop_id: ShopId) {
        (**self).clear_shop(shop_id)
    }
}

/// In-memory shop-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryShopStore<K, V> {
    inner: RwLock<HashMap<(ShopId, K), V>>,
}

impl<K, V> InMemoryShopStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryShopStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ShopStore<K, V> for InMemoryShopStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, shop_id: ShopId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(shop_id, key.clone())).cloned()
    }

    fn upsert(&self, shop_id: ShopId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((shop_id, key), value);
        }
    }

    fn list(&self, shop_id: ShopId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((s, _k), v)| if *s == shop_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_shop(&self, shop_id: ShopId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(s, _k), _v| *s != shop_id);
        }
    }
}
