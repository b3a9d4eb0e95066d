//! 宿主节点类
//!
//! 通过 `nodes.NODE_CLASS_MAPPINGS` 按名称查找节点类, 实例化后绑定其 `FUNCTION` 方法.
//! 在构建能力对象时一次性解析, 缺失的节点在任何处理开始前报错.

use pyo3::{
    types::{PyAnyMethods, PyDict, PyList, PyListMethods, PyTuple, PyTupleMethods},
    Bound, PyAny, Python,
};

use crate::error::Error;

/// 已解析的宿主节点
pub struct NodeClass<'py> {
    name: &'static str,
    function: Bound<'py, PyAny>,
}

impl<'py> NodeClass<'py> {
    /// 按注册名称解析节点
    pub fn resolve(py: Python<'py>, name: &'static str) -> Result<Self, Error> {
        let mappings = py.import("nodes")?.getattr("NODE_CLASS_MAPPINGS")?;
        let class = mappings.call_method1("get", (name,))?;
        if class.is_none() {
            return Err(Error::MissingNode(name.to_string()));
        }

        let instance = class.call0()?;
        let function_name = instance.getattr("FUNCTION")?.extract::<String>()?;
        let function = instance.getattr(function_name.as_str())?;

        Ok(Self { name, function })
    }

    /// 可选节点, 未注册时返回 None
    pub fn resolve_optional(py: Python<'py>, name: &'static str) -> Result<Option<Self>, Error> {
        match Self::resolve(py, name) {
            Ok(node) => Ok(Some(node)),
            Err(Error::MissingNode(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 位置参数调用, 返回节点输出元组
    pub fn call(&self, args: Bound<'py, PyTuple>) -> Result<Bound<'py, PyTuple>, Error> {
        let output = self.function.call1(args)?;
        self.normalize(output)
    }

    /// 关键字参数调用
    pub fn call_kwargs(&self, kwargs: &Bound<'py, PyDict>) -> Result<Bound<'py, PyTuple>, Error> {
        let output = self.function.call((), Some(kwargs))?;
        self.normalize(output)
    }

    /// 关键字参数调用, 返回未归一化的原始输出 (输出节点的 `{"ui": .., "result": ..}`)
    pub fn call_raw(&self, kwargs: &Bound<'py, PyDict>) -> Result<Bound<'py, PyAny>, Error> {
        Ok(self.function.call((), Some(kwargs))?)
    }

    /// 位置参数调用, 返回第一个输出
    pub fn call_first(&self, args: Bound<'py, PyTuple>) -> Result<Bound<'py, PyAny>, Error> {
        let output = self.call(args)?;
        output.get_item(0).map_err(|_| {
            Error::InvalidParameter(format!("node '{}' returned no outputs", self.name))
        })
    }

    /// 兼容 `(a, b)`, `{"result": (a, b)}` 以及带 `result` 属性的输出对象
    fn normalize(&self, output: Bound<'py, PyAny>) -> Result<Bound<'py, PyTuple>, Error> {
        let output = if let Ok(dict) = output.downcast::<PyDict>() {
            dict.as_any().get_item("result")?
        } else if !output.is_instance_of::<PyTuple>() && output.hasattr("result")? {
            output.getattr("result")?
        } else {
            output
        };

        if let Ok(list) = output.downcast::<PyList>() {
            return Ok(list.to_tuple());
        }

        output.downcast_into::<PyTuple>().map_err(|e| {
            Error::PyDowncastError(format!("node '{}' output, {}", self.name, e))
        })
    }
}
