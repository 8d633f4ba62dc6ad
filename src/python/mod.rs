use pyo3::prelude::*;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::types::PyDict;

use crate::config::{Config, TimingConfig};
use crate::error::ControllerError;
use crate::pass::PassController;
use crate::pelco::{MemoryLink, MemoryOpener};

fn to_py_err(err: ControllerError) -> PyErr{
    match err{
        ControllerError::InvalidDuration{ .. } | ControllerError::Config(_) => PyValueError::new_err(err.to_string()),
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

/// Command interface for a web or script front-end.
#[pyclass]
pub struct PyPassController{
    inner: PassController,
}

#[pymethods]
impl PyPassController{
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<&str>) -> PyResult<Self>{
        let config = match config_path{
            Some(path) => Config::load(path).map_err(to_py_err)?,
            None => Config::default(),
        };
        let inner = PassController::serial(config).map_err(to_py_err)?;
        Ok(PyPassController{ inner })
    }

    #[staticmethod]
    #[pyo3(signature = (time_multiplier=1.0))]
    fn dry_run(time_multiplier: f64) -> PyResult<Self>{
        let mut config = Config::default();
        config.timing = TimingConfig::immediate();
        config.motion.time_multiplier = time_multiplier;
        let opener = MemoryOpener::new("dry-run", MemoryLink::new());
        let inner = PassController::new(config, opener).map_err(to_py_err)?;
        Ok(PyPassController{ inner })
    }

    fn status<'py>(&self, py: Python<'py>) -> PyResult<&'py PyDict>{
        let s = self.inner.status();
        let dict = PyDict::new(py);
        dict.set_item("running", s.running)?;
        dict.set_item("message", s.message)?;
        dict.set_item("progress", s.progress)?;
        dict.set_item("port", s.port)?;
        dict.set_item("baud", s.baud)?;
        dict.set_item("last_error", s.last_error)?;
        Ok(dict)
    }

    fn home(&self, py: Python<'_>) -> PyResult<()>{
        let inner = self.inner.clone();
        py.allow_threads(move || inner.home()).map_err(to_py_err)
    }

    fn stop(&self, py: Python<'_>) -> PyResult<()>{
        let inner = self.inner.clone();
        py.allow_threads(move || inner.stop()).map_err(to_py_err)
    }

    fn start(&self, py: Python<'_>, minutes: f64) -> PyResult<()>{
        let inner = self.inner.clone();
        py.allow_threads(move || inner.start(minutes)).map_err(to_py_err)
    }

    fn is_running(&self) -> bool{
        self.inner.is_running()
    }
}

#[pymodule]
fn pelco_pass(_py: Python, m: &PyModule) -> PyResult<()>{
    m.add_class::<PyPassController>()?;
    Ok(())
}
