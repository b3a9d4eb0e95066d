//! 预设文件读写
//!
//! 文件不存在时以默认内容创建; 读取结果按 (修改时间, 文件大小) 缓存,
//! 读取或解析失败时记录日志并返回默认内容

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
    time::UNIX_EPOCH,
};

use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{
    core::config::config_dir,
    error::Error,
    preset::{
        jsonc,
        types::{PresetKind, Presets},
    },
};

// 全局预设文件缓存
static PRESET_CACHE: OnceLock<Mutex<HashMap<PathBuf, CachedFile>>> = OnceLock::new();

#[derive(Debug, Clone)]
struct CachedFile {
    stamp: (f64, u64),
    data: Map<String, Value>,
}

/// 文件修改时间 (秒) 与大小
fn file_stamp(path: &Path) -> Result<(f64, u64), Error> {
    let metadata = fs::metadata(path)?;
    let mtime = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)?
        .as_secs_f64();
    Ok((mtime, metadata.len()))
}

/// 预设目录
#[derive(Debug, Clone)]
pub struct PresetStore {
    dir: PathBuf,
}

impl Default for PresetStore {
    fn default() -> Self {
        Self::new(config_dir())
    }
}

impl PresetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: PresetKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// 文件不存在时写入默认内容, 返回是否新建
    pub fn ensure_exists(&self, kind: PresetKind) -> Result<bool, Error> {
        let path = self.path(kind);
        if path.exists() {
            return Ok(false);
        }

        fs::create_dir_all(&self.dir)?;
        fs::write(&path, serde_json::to_string_pretty(&kind.defaults())?)?;
        info!("created default config file: {}", path.display());
        Ok(true)
    }

    /// 直接读取并解析, 不经过缓存
    pub fn read(&self, kind: PresetKind) -> Result<Map<String, Value>, Error> {
        self.ensure_exists(kind)?;
        let content = fs::read_to_string(self.path(kind))?;
        Ok(jsonc::parse(&content)?)
    }

    /// 读取预设, 文件未变化时使用缓存
    pub fn load(&self, kind: PresetKind) -> Map<String, Value> {
        match self.load_cached(kind) {
            Ok(data) => data,
            Err(e) => {
                warn!("failed to load {}, using defaults, {e}", kind);
                kind.defaults()
            }
        }
    }

    fn load_cached(&self, kind: PresetKind) -> Result<Map<String, Value>, Error> {
        self.ensure_exists(kind)?;
        let path = self.path(kind);
        let stamp = file_stamp(&path)?;

        let cache = PRESET_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
        if let Some(cached) = cache.lock()?.get(&path) {
            if cached.stamp == stamp {
                return Ok(cached.data.clone());
            }
        }

        let data = self.read(kind)?;
        cache.lock()?.insert(
            path,
            CachedFile {
                stamp,
                data: data.clone(),
            },
        );
        Ok(data)
    }

    /// 读取并转换为类型化的预设表
    pub fn presets<T: DeserializeOwned>(&self, kind: PresetKind) -> Presets<T> {
        Presets::from_map(&self.load(kind))
    }

    /// 覆盖写入预设文件
    pub fn save(&self, kind: PresetKind, data: &Map<String, Value>) -> Result<(), Error> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(kind);
        fs::write(&path, serde_json::to_string_pretty(data)?)?;
        info!("saved {}", path.display());
        Ok(())
    }

    /// 文件修改时间, 用于 IS_CHANGED; 文件不存在时为 NaN
    pub fn modified(&self, kind: PresetKind) -> f64 {
        match file_stamp(&self.path(kind)) {
            Ok((mtime, _)) => mtime,
            Err(e) => {
                error!("unable to read mtime of {}, {e}", kind);
                f64::NAN
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::preset::types::PromptPair;

    #[test]
    fn test_missing_file_created_with_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = PresetStore::new(dir.path().join("config"));

        assert!(store.modified(PresetKind::Styles).is_nan());
        assert!(store.ensure_exists(PresetKind::Styles)?);
        assert!(!store.ensure_exists(PresetKind::Styles)?);
        assert!(store.modified(PresetKind::Styles) > 0.0);

        let styles = store.presets::<PromptPair>(PresetKind::Styles);
        assert_eq!(styles.sorted_names(), ["anime", "realistic"]);
        Ok(())
    }

    #[test]
    fn test_reload_after_change() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = PresetStore::new(dir.path());
        let path = store.path(PresetKind::Tags);

        fs::write(&path, "{\n  // hat\n  \"hat\": {\"positive\": \"red hat\"}\n}")?;
        let tags = store.presets::<PromptPair>(PresetKind::Tags);
        assert_eq!(tags.get("hat").map(|t| t.positive.as_str()), Some("red hat"));

        fs::write(&path, r#"{"hat": {"positive": "blue hat"}, "scarf": {}}"#)?;
        let tags = store.presets::<PromptPair>(PresetKind::Tags);
        assert_eq!(tags.get("hat").map(|t| t.positive.as_str()), Some("blue hat"));
        assert_eq!(tags.len(), 2);
        Ok(())
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = PresetStore::new(dir.path());
        fs::write(store.path(PresetKind::Wildcards), "{ not json")?;

        let wildcards = store.load(PresetKind::Wildcards);
        assert_eq!(wildcards, PresetKind::Wildcards.defaults());
        assert!(store.read(PresetKind::Wildcards).is_err());
        Ok(())
    }

    #[test]
    fn test_save_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = PresetStore::new(dir.path());

        let Value::Object(data) = json!({"bob": {"character": "1boy"}}) else {
            anyhow::bail!("expected object");
        };
        store.save(PresetKind::Characters, &data)?;
        assert_eq!(store.read(PresetKind::Characters)?, data);
        Ok(())
    }
}
