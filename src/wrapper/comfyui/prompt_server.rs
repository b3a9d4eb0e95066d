//! Prompt Server
//!
//! 通过 `server.PromptServer.instance.send_sync` 向前端推送消息

use std::fmt::Display;

use log::error;
use pyo3::{
    exceptions::PyRuntimeError,
    types::{PyAnyMethods, PyDict, PyDictMethods, PyModule},
    Bound, PyErr, PyResult, PyTypeInfo, Python,
};

/// 前端消息事件名称
const EVENT_NAME: &str = "mudknight";

/// 推送一条事件数据到前端
fn send_sync<'py>(py: Python<'py>, data: Bound<'py, PyDict>) -> PyResult<()> {
    PyModule::import(py, "server")?
        .getattr("PromptServer")?
        .getattr("instance")?
        .call_method1("send_sync", (EVENT_NAME, data))?;
    Ok(())
}

/// comfyui PromptServer wrapper
pub trait PromptServer: PyTypeInfo {
    /// 节点执行出现异常时通知前端
    fn send_error(&self, py: Python, error_type: String, message: String) -> PyResult<()> {
        let data = PyDict::new(py);
        data.set_item("type", &error_type)?;
        data.set_item("level", "error")?;
        data.set_item("node", self.get_class_name(py)?)?;
        data.set_item("message", message)?;
        send_sync(py, data)
    }

    /// 非致命状态提示, 例如未检测到区域时直接透传
    fn send_status(&self, py: Python, message: String) -> PyResult<()> {
        let data = PyDict::new(py);
        data.set_item("type", "status")?;
        data.set_item("level", "info")?;
        data.set_item("node", self.get_class_name(py)?)?;
        data.set_item("message", message)?;
        send_sync(py, data)
    }

    /// 记录错误并通知前端, 返回抛给宿主的 RuntimeError
    fn raise_error(&self, py: Python, node: &str, e: impl Display) -> PyErr {
        error!("{node} error, {e}");
        if let Err(send_err) = self.send_error(py, node.to_string(), e.to_string()) {
            error!("send error failed, {send_err}");
        }
        PyErr::new::<PyRuntimeError, _>(e.to_string())
    }

    /// Class 名称
    fn get_class_name(&self, py: Python) -> PyResult<String> {
        Self::type_object(py)
            .getattr("__name__")?
            .extract::<String>()
    }
}

#[cfg(test)]
mod tests {
    use pyo3::pyclass;

    use super::*;

    #[pyclass]
    struct FailingNode {}

    impl PromptServer for FailingNode {}

    #[test]
    #[ignore]
    fn test_raise_error_keeps_node_error() -> anyhow::Result<()> {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            // 没有 server 模块, 推送失败
            let node = FailingNode {};
            let err = node.raise_error(py, "FailingNode", "bbox is outside of the image");
            assert!(err.is_instance_of::<PyRuntimeError>(py));
            assert_eq!(err.value(py).to_string(), "bbox is outside of the image");
            Ok(())
        })
    }
}
