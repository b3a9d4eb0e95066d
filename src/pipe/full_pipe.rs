//! 管道对象
//!
//! 模型, CLIP, VAE, 条件, 提示词, 种子与图片打包为一个值在节点间传递.
//! 字段未设置时为 None; 修改总是生成新的管道 (浅拷贝, 句柄共享).

use std::sync::Arc;

use pyo3::{
    exceptions::PyKeyError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods},
    Bound, IntoPyObject, Py, PyAny, PyErr, PyObject, PyResult, Python,
};

use crate::{
    error::Error,
    wrapper::comfyui::types::{
        NODE_CLIP, NODE_CONDITIONING, NODE_IMAGE, NODE_INT, NODE_MODEL, NODE_STRING, NODE_VAE,
    },
};

/// 管道字段名称与类型, 顺序即 FullPipeOut 的输出顺序
pub const PIPE_FIELDS: [(&str, &str); 10] = [
    ("model", NODE_MODEL),
    ("clip", NODE_CLIP),
    ("vae", NODE_VAE),
    ("positive", NODE_CONDITIONING),
    ("negative", NODE_CONDITIONING),
    ("positive_text", NODE_STRING),
    ("negative_text", NODE_STRING),
    ("ckpt_name", NODE_STRING),
    ("seed", NODE_INT),
    ("image", NODE_IMAGE),
];

/// 宿主对象句柄
#[derive(Debug, Clone)]
pub struct PyHandle(Arc<Py<PyAny>>);

impl PyHandle {
    pub fn new(obj: &Bound<'_, PyAny>) -> Self {
        Self(Arc::new(obj.clone().unbind()))
    }

    pub fn bind<'py>(&self, py: Python<'py>) -> &Bound<'py, PyAny> {
        self.0.bind(py)
    }
}

impl From<&Bound<'_, PyAny>> for PyHandle {
    fn from(obj: &Bound<'_, PyAny>) -> Self {
        PyHandle::new(obj)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipe<H> {
    pub model: Option<H>,
    pub clip: Option<H>,
    pub vae: Option<H>,
    pub positive: Option<H>,
    pub negative: Option<H>,
    pub positive_text: Option<String>,
    pub negative_text: Option<String>,
    pub ckpt_name: Option<String>,
    pub seed: Option<u64>,
    pub image: Option<H>,
}

impl<H> Default for Pipe<H> {
    fn default() -> Self {
        Self {
            model: None,
            clip: None,
            vae: None,
            positive: None,
            negative: None,
            positive_text: None,
            negative_text: None,
            ckpt_name: None,
            seed: None,
            image: None,
        }
    }
}

fn require<'a, T>(field: &'a Option<T>, name: &'static str) -> Result<&'a T, Error> {
    field.as_ref().ok_or(Error::MissingPipeField(name))
}

/// 空字符串视为未提供
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl<H: Clone> Pipe<H> {
    /// 用 patch 中已提供的字段覆盖当前值, 返回新管道
    pub fn merge(&self, patch: Pipe<H>) -> Self {
        Self {
            model: patch.model.or_else(|| self.model.clone()),
            clip: patch.clip.or_else(|| self.clip.clone()),
            vae: patch.vae.or_else(|| self.vae.clone()),
            positive: patch.positive.or_else(|| self.positive.clone()),
            negative: patch.negative.or_else(|| self.negative.clone()),
            positive_text: non_empty(patch.positive_text).or_else(|| self.positive_text.clone()),
            negative_text: non_empty(patch.negative_text).or_else(|| self.negative_text.clone()),
            ckpt_name: non_empty(patch.ckpt_name).or_else(|| self.ckpt_name.clone()),
            seed: patch.seed.or(self.seed),
            image: patch.image.or_else(|| self.image.clone()),
        }
    }

    pub fn with_image(&self, image: H) -> Self {
        Self {
            image: Some(image),
            ..self.clone()
        }
    }

    /// 提示词文本总是覆盖, 空字符串同样写入
    pub fn with_prompt_texts(&self, positive_text: String, negative_text: String) -> Self {
        Self {
            positive_text: Some(positive_text),
            negative_text: Some(negative_text),
            ..self.clone()
        }
    }

    pub fn with_model_and_clip(&self, model: H, clip: H) -> Self {
        Self {
            model: Some(model),
            clip: Some(clip),
            ..self.clone()
        }
    }

    pub fn require_model(&self) -> Result<&H, Error> {
        require(&self.model, "model")
    }

    pub fn require_clip(&self) -> Result<&H, Error> {
        require(&self.clip, "clip")
    }

    pub fn require_vae(&self) -> Result<&H, Error> {
        require(&self.vae, "vae")
    }

    pub fn require_positive(&self) -> Result<&H, Error> {
        require(&self.positive, "positive")
    }

    pub fn require_negative(&self) -> Result<&H, Error> {
        require(&self.negative, "negative")
    }

    pub fn require_image(&self) -> Result<&H, Error> {
        require(&self.image, "image")
    }

    /// 未设置时为 0
    pub fn seed_or_default(&self) -> u64 {
        self.seed.unwrap_or(0)
    }
}

/// FULL_PIPE
///
/// 提供只读的 dict 风格访问, 兼容按键读取管道的节点
#[pyclass(name = "FullPipe", module = "comfyui_mudknight_utils.pipe", frozen)]
#[derive(Debug, Clone, Default)]
pub struct FullPipe {
    pub inner: Pipe<PyHandle>,
}

impl FullPipe {
    pub fn new(inner: Pipe<PyHandle>) -> Self {
        Self { inner }
    }

    /// 字段转为 python 对象, 未设置或未知字段返回 None
    pub fn field<'py>(&self, py: Python<'py>, name: &str) -> Result<Option<Bound<'py, PyAny>>, PyErr> {
        let handle = |h: &Option<PyHandle>| h.as_ref().map(|h| h.bind(py).clone());
        let text = |t: &Option<String>| -> Result<Option<Bound<'py, PyAny>>, PyErr> {
            Ok(match t {
                Some(t) => Some(t.into_pyobject(py)?.into_any()),
                None => None,
            })
        };

        let pipe = &self.inner;
        Ok(match name {
            "model" => handle(&pipe.model),
            "clip" => handle(&pipe.clip),
            "vae" => handle(&pipe.vae),
            "positive" => handle(&pipe.positive),
            "negative" => handle(&pipe.negative),
            "positive_text" => text(&pipe.positive_text)?,
            "negative_text" => text(&pipe.negative_text)?,
            "ckpt_name" => text(&pipe.ckpt_name)?,
            "seed" => match pipe.seed {
                Some(seed) => Some(seed.into_pyobject(py)?.into_any()),
                None => None,
            },
            "image" => handle(&pipe.image),
            _ => None,
        })
    }
}

#[pymethods]
impl FullPipe {
    #[pyo3(signature = (key, default=None))]
    fn get(&self, py: Python<'_>, key: &str, default: Option<PyObject>) -> PyResult<PyObject> {
        match self.field(py, key)? {
            Some(value) => Ok(value.unbind()),
            None => Ok(default.unwrap_or_else(|| py.None())),
        }
    }

    fn __getitem__(&self, py: Python<'_>, key: &str) -> PyResult<PyObject> {
        match self.field(py, key)? {
            Some(value) => Ok(value.unbind()),
            None => Err(PyKeyError::new_err(key.to_string())),
        }
    }

    fn __contains__(&self, py: Python<'_>, key: &str) -> PyResult<bool> {
        Ok(self.field(py, key)?.is_some())
    }

    /// 已设置的字段
    fn keys(&self, py: Python<'_>) -> PyResult<Vec<&'static str>> {
        let mut keys = Vec::new();
        for (name, _) in PIPE_FIELDS {
            if self.field(py, name)?.is_some() {
                keys.push(name);
            }
        }
        Ok(keys)
    }

    fn copy(&self) -> Self {
        self.clone()
    }

    fn __repr__(&self, py: Python<'_>) -> PyResult<String> {
        Ok(format!("FullPipe({})", self.keys(py)?.join(", ")))
    }
}

/// 管道字段的输入定义, 文本与种子只接受连线
pub fn add_field_input(
    py: Python<'_>,
    dict: &Bound<'_, PyDict>,
    name: &str,
    node_type: &str,
) -> PyResult<()> {
    if node_type == NODE_STRING || node_type == NODE_INT {
        let options = PyDict::new(py);
        options.set_item("forceInput", true)?;
        dict.set_item(name, (node_type, options))
    } else {
        dict.set_item(name, (node_type,))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe() -> Pipe<&'static str> {
        Pipe {
            model: Some("model-a"),
            clip: Some("clip-a"),
            vae: Some("vae-a"),
            positive_text: Some("1girl".to_string()),
            seed: Some(7),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_overrides_provided_fields() -> anyhow::Result<()> {
        let base = pipe();
        let merged = base.merge(Pipe {
            model: Some("model-b"),
            positive_text: Some("".to_string()),
            negative_text: Some("lowres".to_string()),
            seed: Some(0),
            ..Default::default()
        });

        assert_eq!(merged.model, Some("model-b"));
        assert_eq!(merged.clip, Some("clip-a"));
        assert_eq!(merged.positive_text.as_deref(), Some("1girl"));
        assert_eq!(merged.negative_text.as_deref(), Some("lowres"));
        assert_eq!(merged.seed, Some(0));
        // 原管道不变
        assert_eq!(base.model, Some("model-a"));
        assert_eq!(base.negative_text, None);
        Ok(())
    }

    #[test]
    fn test_with_prompt_texts_overwrites_empty() -> anyhow::Result<()> {
        let updated = pipe().with_prompt_texts(String::new(), "lowres".to_string());
        assert_eq!(updated.positive_text.as_deref(), Some(""));
        assert_eq!(updated.negative_text.as_deref(), Some("lowres"));
        assert_eq!(updated.model, Some("model-a"));
        Ok(())
    }

    #[test]
    fn test_require_missing_field() -> anyhow::Result<()> {
        let base = pipe();
        assert_eq!(*base.require_model()?, "model-a");
        match base.require_image() {
            Err(Error::MissingPipeField(name)) => assert_eq!(name, "image"),
            other => anyhow::bail!("unexpected {other:?}"),
        }
        assert_eq!(
            base.require_positive().map_err(|e| e.to_string()).err().as_deref(),
            Some("full_pipe must contain 'positive'")
        );
        Ok(())
    }

    #[test]
    fn test_with_image() -> anyhow::Result<()> {
        let base = pipe();
        let updated = base.with_image("image-1");
        assert_eq!(updated.image, Some("image-1"));
        assert_eq!(updated.seed_or_default(), 7);
        assert_eq!(base.image, None);
        assert_eq!(Pipe::<&str>::default().seed_or_default(), 0);
        Ok(())
    }
}
