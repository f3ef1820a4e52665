//! Native VST3 loader.
//!
//! Loads the module's dynamic library, asks the factory for vendor and
//! class metadata, and best-effort reads the parameter surface through the
//! edit controller. The library is unloaded again before this returns; the
//! caller only ever sees extracted data.
//!
//! Everything in here runs third-party native code that is allowed to
//! crash, which is why only the worker process calls it.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr;

use libloading::{Library, Symbol};

use plugdex_core::ParamValue;

use crate::ffi::{
    self, AUDIO_MODULE_CATEGORY, GetPluginFactoryProc, IComponentVtbl, IEditControllerVtbl,
    IID_ICOMPONENT, IID_IEDIT_CONTROLLER, IPluginFactoryVtbl, K_RESULT_OK, PClassInfo,
    PFactoryInfo, ParameterInfo, Tuid,
};
use crate::{LoadedPlugin, LoaderError, PluginLoader};

pub struct Vst3Loader;

impl PluginLoader for Vst3Loader {
    fn open(&self, path: &Path, name: &str) -> Result<LoadedPlugin, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::NotFound(path.to_path_buf()));
        }
        let library_path = resolve_library_path(path)?;
        if !library_path.exists() {
            return Err(LoaderError::NotFound(library_path));
        }
        tracing::debug!("loading VST3 library {}", library_path.display());

        #[allow(unsafe_code)]
        unsafe {
            extract(&library_path, name)
        }
    }
}

/// Resolve the platform binary inside a `.vst3` bundle directory; plain
/// files are their own binary.
fn resolve_library_path(path: &Path) -> Result<PathBuf, LoaderError> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| LoaderError::Library(format!("invalid bundle name: {}", path.display())))?;

    let inner = if cfg!(target_os = "macos") {
        path.join("Contents").join("MacOS").join(stem)
    } else if cfg!(target_os = "windows") {
        path.join("Contents")
            .join(format!("{}-win", std::env::consts::ARCH))
            .join(format!("{stem}.vst3"))
    } else {
        path.join("Contents")
            .join(format!("{}-linux", std::env::consts::ARCH))
            .join(format!("{stem}.so"))
    };
    Ok(inner)
}

struct ClassEntry {
    cid: Tuid,
    category: String,
    name: String,
}

#[allow(unsafe_code)]
unsafe fn extract(library_path: &Path, wanted_name: &str) -> Result<LoadedPlugin, LoaderError> {
    let library =
        unsafe { Library::new(library_path) }.map_err(|e| LoaderError::Library(e.to_string()))?;

    let get_factory: Symbol<'_, GetPluginFactoryProc> =
        unsafe { library.get(b"GetPluginFactory") }
            .map_err(|e| LoaderError::EntryPoint(e.to_string()))?;

    let factory_ptr = unsafe { get_factory() };
    if factory_ptr.is_null() {
        return Err(LoaderError::Factory(
            "GetPluginFactory returned null".to_string(),
        ));
    }
    let factory = unsafe { ffi::vtbl::<IPluginFactoryVtbl>(factory_ptr) };

    let manufacturer = unsafe { read_vendor(factory_ptr) };
    let classes = unsafe { read_classes(factory_ptr) };

    let chosen = classes
        .iter()
        .find(|c| c.category == AUDIO_MODULE_CATEGORY && c.name == wanted_name)
        .or_else(|| classes.iter().find(|c| c.category == AUDIO_MODULE_CATEGORY))
        .or_else(|| classes.first());
    let Some(chosen) = chosen else {
        unsafe { (factory.base.release)(factory_ptr) };
        return Err(LoaderError::Factory(
            "module exports no plugin classes".to_string(),
        ));
    };

    let parameters = unsafe { read_parameters(factory_ptr, &chosen.cid) };
    let name = if chosen.name.is_empty() {
        None
    } else {
        Some(chosen.name.clone())
    };

    unsafe { (factory.base.release)(factory_ptr) };
    drop(library);

    Ok(LoadedPlugin {
        name,
        manufacturer,
        parameters,
    })
}

#[allow(unsafe_code)]
unsafe fn read_vendor(factory_ptr: *mut c_void) -> Option<String> {
    let factory = unsafe { ffi::vtbl::<IPluginFactoryVtbl>(factory_ptr) };
    let mut info: PFactoryInfo = unsafe { std::mem::zeroed() };
    if unsafe { (factory.get_factory_info)(factory_ptr, &mut info) } != K_RESULT_OK {
        return None;
    }
    let vendor = ffi::c_str_field(&info.vendor);
    if vendor.is_empty() { None } else { Some(vendor) }
}

#[allow(unsafe_code)]
unsafe fn read_classes(factory_ptr: *mut c_void) -> Vec<ClassEntry> {
    let factory = unsafe { ffi::vtbl::<IPluginFactoryVtbl>(factory_ptr) };
    let count = unsafe { (factory.count_classes)(factory_ptr) };
    let mut classes = Vec::new();
    for index in 0..count {
        let mut info: PClassInfo = unsafe { std::mem::zeroed() };
        if unsafe { (factory.get_class_info)(factory_ptr, index, &mut info) } != K_RESULT_OK {
            continue;
        }
        classes.push(ClassEntry {
            cid: info.cid,
            category: ffi::c_str_field(&info.category),
            name: ffi::c_str_field(&info.name),
        });
    }
    classes
}

/// Best-effort parameter extraction through the edit controller.
///
/// Commercial plug-ins put the controller in a separate class reached via
/// `IComponent::getControllerClassId`; simple ones implement it on the
/// component object itself. Either path failing just means an empty
/// parameter surface; identity extraction must still succeed.
#[allow(unsafe_code)]
unsafe fn read_parameters(factory_ptr: *mut c_void, cid: &Tuid) -> Vec<(String, ParamValue)> {
    let factory = unsafe { ffi::vtbl::<IPluginFactoryVtbl>(factory_ptr) };

    let mut component: *mut c_void = ptr::null_mut();
    let created = unsafe {
        (factory.create_instance)(factory_ptr, cid, &IID_ICOMPONENT, &mut component)
    };
    if created != K_RESULT_OK || component.is_null() {
        return Vec::new();
    }
    let component_vtbl = unsafe { ffi::vtbl::<IComponentVtbl>(component) };
    let _ = unsafe { (component_vtbl.initialize)(component, ptr::null_mut()) };

    // Controller on the component object itself (simple plug-ins)?
    let mut controller: *mut c_void = ptr::null_mut();
    let mut separate_controller = false;
    let queried = unsafe {
        (component_vtbl.base.query_interface)(component, &IID_IEDIT_CONTROLLER, &mut controller)
    };
    if queried != K_RESULT_OK || controller.is_null() {
        controller = ptr::null_mut();
        let mut controller_cid: Tuid = [0; 16];
        let has_cid = unsafe {
            (component_vtbl.get_controller_class_id)(component, &mut controller_cid)
        };
        if has_cid == K_RESULT_OK && controller_cid.iter().any(|&b| b != 0) {
            let created = unsafe {
                (factory.create_instance)(
                    factory_ptr,
                    &controller_cid,
                    &IID_IEDIT_CONTROLLER,
                    &mut controller,
                )
            };
            if created == K_RESULT_OK && !controller.is_null() {
                separate_controller = true;
                let controller_vtbl = unsafe { ffi::vtbl::<IEditControllerVtbl>(controller) };
                let _ = unsafe { (controller_vtbl.initialize)(controller, ptr::null_mut()) };
            } else {
                controller = ptr::null_mut();
            }
        }
    }

    let mut parameters = Vec::new();
    if !controller.is_null() {
        let controller_vtbl = unsafe { ffi::vtbl::<IEditControllerVtbl>(controller) };
        let count = unsafe { (controller_vtbl.get_parameter_count)(controller) };
        for index in 0..count {
            let mut info: ParameterInfo = unsafe { std::mem::zeroed() };
            let got = unsafe { (controller_vtbl.get_parameter_info)(controller, index, &mut info) };
            if got != K_RESULT_OK {
                continue;
            }
            let title = ffi::utf16_field(&info.title);
            if title.is_empty() {
                continue;
            }
            let value = unsafe { (controller_vtbl.get_param_normalized)(controller, info.id) };
            // A two-state parameter is a switch, not a continuous control
            let value = if info.step_count == 1 {
                ParamValue::Bool(value >= 0.5)
            } else {
                ParamValue::Float(value)
            };
            parameters.push((title, value));
        }
        if separate_controller {
            let _ = unsafe { (controller_vtbl.terminate)(controller) };
        }
        unsafe { (controller_vtbl.base.release)(controller) };
    }

    let _ = unsafe { (component_vtbl.terminate)(component) };
    unsafe { (component_vtbl.base.release)(component) };
    parameters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_library_path() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Gain.vst3");
        std::fs::create_dir_all(&bundle).unwrap();

        let inner = resolve_library_path(&bundle).unwrap();
        if cfg!(target_os = "macos") {
            assert!(inner.ends_with("Contents/MacOS/Gain"));
        } else if cfg!(target_os = "windows") {
            assert!(inner.to_string_lossy().ends_with("Gain.vst3"));
        } else {
            assert!(inner.to_string_lossy().ends_with("Gain.so"));
        }
    }

    #[test]
    fn test_plain_file_is_its_own_library() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Flat.vst3");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(resolve_library_path(&file).unwrap(), file);
    }

    #[test]
    fn test_garbage_file_is_a_library_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("NotAPlugin.vst3");
        std::fs::write(&file, b"this is not a shared object").unwrap();

        let result = Vst3Loader.open(&file, "NotAPlugin");
        assert!(matches!(result, Err(LoaderError::Library(_))));
    }
}
