//! Raw VST3 COM surface.
//!
//! VST3 modules export a single `GetPluginFactory` entry point returning a
//! COM-style object; everything else is vtable calls with manual reference
//! counting. Only the slices of `IPluginFactory`, `IComponent` and
//! `IEditController` that metadata extraction needs are declared here.
//! Vtable layouts must match the SDK headers exactly, including the
//! methods this crate never calls.

use std::ffi::{c_char, c_void};

pub type Tuid = [u8; 16];
pub type TResult = i32;

pub const K_RESULT_OK: TResult = 0;

/// Pack a 128-bit interface id from the four 32-bit words the SDK headers
/// use. Windows builds use the COM-compatible byte order, everything else
/// is plain big-endian.
#[must_use]
pub const fn uid(l1: u32, l2: u32, l3: u32, l4: u32) -> Tuid {
    if cfg!(target_os = "windows") {
        [
            (l1 & 0xFF) as u8,
            ((l1 >> 8) & 0xFF) as u8,
            ((l1 >> 16) & 0xFF) as u8,
            ((l1 >> 24) & 0xFF) as u8,
            ((l2 >> 16) & 0xFF) as u8,
            ((l2 >> 24) & 0xFF) as u8,
            (l2 & 0xFF) as u8,
            ((l2 >> 8) & 0xFF) as u8,
            ((l3 >> 24) & 0xFF) as u8,
            ((l3 >> 16) & 0xFF) as u8,
            ((l3 >> 8) & 0xFF) as u8,
            (l3 & 0xFF) as u8,
            ((l4 >> 24) & 0xFF) as u8,
            ((l4 >> 16) & 0xFF) as u8,
            ((l4 >> 8) & 0xFF) as u8,
            (l4 & 0xFF) as u8,
        ]
    } else {
        [
            ((l1 >> 24) & 0xFF) as u8,
            ((l1 >> 16) & 0xFF) as u8,
            ((l1 >> 8) & 0xFF) as u8,
            (l1 & 0xFF) as u8,
            ((l2 >> 24) & 0xFF) as u8,
            ((l2 >> 16) & 0xFF) as u8,
            ((l2 >> 8) & 0xFF) as u8,
            (l2 & 0xFF) as u8,
            ((l3 >> 24) & 0xFF) as u8,
            ((l3 >> 16) & 0xFF) as u8,
            ((l3 >> 8) & 0xFF) as u8,
            (l3 & 0xFF) as u8,
            ((l4 >> 24) & 0xFF) as u8,
            ((l4 >> 16) & 0xFF) as u8,
            ((l4 >> 8) & 0xFF) as u8,
            (l4 & 0xFF) as u8,
        ]
    }
}

pub const IID_ICOMPONENT: Tuid = uid(0xE831_FF31, 0xF2D5_4301, 0x928E_BBEE, 0x2569_7802);
pub const IID_IEDIT_CONTROLLER: Tuid = uid(0xDCD7_BBE3, 0x7742_448D, 0xA874_AAF8, 0x4F5A_07B5);

/// Class category string of audio effect / instrument classes
pub const AUDIO_MODULE_CATEGORY: &str = "Audio Module Class";

/// `GetPluginFactory` entry point signature
pub type GetPluginFactoryProc = unsafe extern "system" fn() -> *mut c_void;

#[repr(C)]
pub struct PFactoryInfo {
    pub vendor: [c_char; 64],
    pub url: [c_char; 256],
    pub email: [c_char; 128],
    pub flags: i32,
}

#[repr(C)]
pub struct PClassInfo {
    pub cid: Tuid,
    pub cardinality: i32,
    pub category: [c_char; 32],
    pub name: [c_char; 64],
}

/// `Steinberg::Vst::ParameterInfo`; titles and units are UTF-16
#[repr(C)]
pub struct ParameterInfo {
    pub id: u32,
    pub title: [i16; 128],
    pub short_title: [i16; 128],
    pub units: [i16; 128],
    pub step_count: i32,
    pub default_normalized_value: f64,
    pub unit_id: i32,
    pub flags: i32,
}

#[repr(C)]
pub struct FUnknownVtbl {
    pub query_interface: unsafe extern "system" fn(
        this: *mut c_void,
        iid: *const Tuid,
        obj: *mut *mut c_void,
    ) -> TResult,
    pub add_ref: unsafe extern "system" fn(this: *mut c_void) -> u32,
    pub release: unsafe extern "system" fn(this: *mut c_void) -> u32,
}

#[repr(C)]
pub struct IPluginFactoryVtbl {
    pub base: FUnknownVtbl,
    pub get_factory_info:
        unsafe extern "system" fn(this: *mut c_void, info: *mut PFactoryInfo) -> TResult,
    pub count_classes: unsafe extern "system" fn(this: *mut c_void) -> i32,
    pub get_class_info:
        unsafe extern "system" fn(this: *mut c_void, index: i32, info: *mut PClassInfo) -> TResult,
    pub create_instance: unsafe extern "system" fn(
        this: *mut c_void,
        cid: *const Tuid,
        iid: *const Tuid,
        obj: *mut *mut c_void,
    ) -> TResult,
}

#[repr(C)]
pub struct IComponentVtbl {
    pub base: FUnknownVtbl,
    // IPluginBase
    pub initialize: unsafe extern "system" fn(this: *mut c_void, context: *mut c_void) -> TResult,
    pub terminate: unsafe extern "system" fn(this: *mut c_void) -> TResult,
    // IComponent
    pub get_controller_class_id:
        unsafe extern "system" fn(this: *mut c_void, cid: *mut Tuid) -> TResult,
    pub set_io_mode: unsafe extern "system" fn(this: *mut c_void, mode: i32) -> TResult,
    pub get_bus_count: unsafe extern "system" fn(this: *mut c_void, type_: i32, dir: i32) -> i32,
    pub get_bus_info: unsafe extern "system" fn(
        this: *mut c_void,
        type_: i32,
        dir: i32,
        index: i32,
        info: *mut c_void,
    ) -> TResult,
    pub get_routing_info: unsafe extern "system" fn(
        this: *mut c_void,
        in_info: *mut c_void,
        out_info: *mut c_void,
    ) -> TResult,
    pub activate_bus: unsafe extern "system" fn(
        this: *mut c_void,
        type_: i32,
        dir: i32,
        index: i32,
        state: i32,
    ) -> TResult,
    pub set_active: unsafe extern "system" fn(this: *mut c_void, state: i32) -> TResult,
    pub set_state: unsafe extern "system" fn(this: *mut c_void, state: *mut c_void) -> TResult,
    pub get_state: unsafe extern "system" fn(this: *mut c_void, state: *mut c_void) -> TResult,
}

#[repr(C)]
pub struct IEditControllerVtbl {
    pub base: FUnknownVtbl,
    // IPluginBase
    pub initialize: unsafe extern "system" fn(this: *mut c_void, context: *mut c_void) -> TResult,
    pub terminate: unsafe extern "system" fn(this: *mut c_void) -> TResult,
    // IEditController
    pub set_component_state:
        unsafe extern "system" fn(this: *mut c_void, state: *mut c_void) -> TResult,
    pub set_state: unsafe extern "system" fn(this: *mut c_void, state: *mut c_void) -> TResult,
    pub get_state: unsafe extern "system" fn(this: *mut c_void, state: *mut c_void) -> TResult,
    pub get_parameter_count: unsafe extern "system" fn(this: *mut c_void) -> i32,
    pub get_parameter_info: unsafe extern "system" fn(
        this: *mut c_void,
        param_index: i32,
        info: *mut ParameterInfo,
    ) -> TResult,
    pub get_param_string_by_value: unsafe extern "system" fn(
        this: *mut c_void,
        id: u32,
        value: f64,
        string: *mut c_void,
    ) -> TResult,
    pub get_param_value_by_string: unsafe extern "system" fn(
        this: *mut c_void,
        id: u32,
        string: *mut c_void,
        value: *mut f64,
    ) -> TResult,
    pub normalized_param_to_plain:
        unsafe extern "system" fn(this: *mut c_void, id: u32, value: f64) -> f64,
    pub plain_param_to_normalized:
        unsafe extern "system" fn(this: *mut c_void, id: u32, plain_value: f64) -> f64,
    pub get_param_normalized: unsafe extern "system" fn(this: *mut c_void, id: u32) -> f64,
    pub set_param_normalized:
        unsafe extern "system" fn(this: *mut c_void, id: u32, value: f64) -> TResult,
    pub set_component_handler:
        unsafe extern "system" fn(this: *mut c_void, handler: *mut c_void) -> TResult,
    pub create_view:
        unsafe extern "system" fn(this: *mut c_void, name: *const c_char) -> *mut c_void,
}

/// Read the vtable of a COM object pointer.
///
/// # Safety
///
/// `ptr` must be a valid COM object whose first field is a pointer to a
/// vtable of type `T`.
#[allow(unsafe_code)]
pub unsafe fn vtbl<'a, T>(ptr: *mut c_void) -> &'a T {
    unsafe { &**ptr.cast::<*mut T>() }
}

/// Decode a fixed-size, NUL-terminated C string field.
pub fn c_str_field(field: &[c_char]) -> String {
    let bytes: Vec<u8> = field
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

/// Decode a fixed-size, NUL-terminated UTF-16 string field.
pub fn utf16_field(field: &[i16]) -> String {
    let units: Vec<u16> = field
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u16)
        .collect();
    String::from_utf16_lossy(&units).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_packing_non_windows() {
        if cfg!(target_os = "windows") {
            return;
        }
        let id = uid(0xE831_FF31, 0xF2D5_4301, 0x928E_BBEE, 0x2569_7802);
        assert_eq!(&id[..4], &[0xE8, 0x31, 0xFF, 0x31]);
        assert_eq!(&id[12..], &[0x25, 0x69, 0x78, 0x02]);
    }

    #[test]
    fn test_c_str_field_stops_at_nul() {
        let mut field = [0 as c_char; 64];
        for (i, b) in b"Acme Audio".iter().enumerate() {
            field[i] = *b as c_char;
        }
        assert_eq!(c_str_field(&field), "Acme Audio");
    }

    #[test]
    fn test_utf16_field() {
        let mut field = [0i16; 128];
        for (i, u) in "Gain".encode_utf16().enumerate() {
            field[i] = u as i16;
        }
        assert_eq!(utf16_field(&field), "Gain");
    }
}
