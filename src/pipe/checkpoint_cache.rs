//! 单条目检查点缓存
//!
//! 仅保留最近一次加载的模型, 未命中时先释放旧条目再加载

use log::info;

use crate::pipe::lora::LoraEntry;

/// 影响模型权重的参数
#[derive(Debug, Clone, PartialEq)]
pub struct CacheKey {
    pub ckpt_name: String,
    pub clip_skip: i32,
    pub loras: Option<Vec<LoraEntry>>,
}

pub struct CheckpointCache<T> {
    entry: Option<(CacheKey, T)>,
}

impl<T> Default for CheckpointCache<T> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<T: Clone> CheckpointCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&T> {
        match &self.entry {
            Some((cached, value)) if cached == key => Some(value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.entry.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    /// 命中时返回缓存; 否则释放旧条目, 调用 on_evict, 再加载
    ///
    /// 加载失败时缓存保持为空
    pub fn get_or_load<E, L, V>(&mut self, key: CacheKey, load: L, on_evict: V) -> Result<T, E>
    where
        L: FnOnce(&CacheKey) -> Result<T, E>,
        V: FnOnce(),
    {
        if let Some(value) = self.get(&key) {
            return Ok(value.clone());
        }

        if let Some((old, value)) = self.entry.take() {
            info!("evicting cached checkpoint {}", old.ckpt_name);
            drop(value);
            on_evict();
        }

        let value = load(&key)?;
        self.entry = Some((key, value.clone()));
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey {
            ckpt_name: name.to_string(),
            clip_skip: -2,
            loras: None,
        }
    }

    #[test]
    fn test_single_entry() -> anyhow::Result<()> {
        let mut cache = CheckpointCache::<String>::new();
        let loads = Cell::new(0);
        let evictions = Cell::new(0);
        let mut load = |k: &CacheKey| -> anyhow::Result<String> {
            loads.set(loads.get() + 1);
            Ok(format!("weights:{}", k.ckpt_name))
        };

        assert_eq!(cache.get_or_load(key("a"), &mut load, || evictions.set(evictions.get() + 1))?, "weights:a");
        assert_eq!(cache.get_or_load(key("a"), &mut load, || evictions.set(evictions.get() + 1))?, "weights:a");
        assert_eq!(loads.get(), 1);
        assert_eq!(evictions.get(), 0);

        assert_eq!(cache.get_or_load(key("b"), &mut load, || evictions.set(evictions.get() + 1))?, "weights:b");
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.get(&key("b")).map(String::as_str), Some("weights:b"));
        assert_eq!(loads.get(), 2);
        assert_eq!(evictions.get(), 1);
        Ok(())
    }

    #[test]
    fn test_lora_stack_is_part_of_key() -> anyhow::Result<()> {
        let mut cache = CheckpointCache::<u32>::new();
        let with_lora = CacheKey {
            loras: Some(vec![LoraEntry::new("detail.safetensors", 0.8, 1.0)]),
            ..key("a")
        };

        cache.get_or_load(key("a"), |_| Ok::<_, anyhow::Error>(1), || {})?;
        let value = cache.get_or_load(with_lora.clone(), |_| Ok::<_, anyhow::Error>(2), || {})?;
        assert_eq!(value, 2);
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.get(&with_lora), Some(&2));
        Ok(())
    }

    #[test]
    fn test_failed_load_leaves_cache_empty() -> anyhow::Result<()> {
        let mut cache = CheckpointCache::<u32>::new();
        cache.get_or_load(key("a"), |_| Ok::<_, anyhow::Error>(1), || {})?;
        let result = cache.get_or_load(key("b"), |_| Err(anyhow::anyhow!("missing")), || {});
        assert!(result.is_err());
        assert!(cache.is_empty());
        Ok(())
    }
}
