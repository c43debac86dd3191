mod api;
mod app;
mod config;
mod detail_cache;
mod engine;
mod export;
mod leaflet;
mod popup;
mod renderer;
mod surface;
mod timers;

use leptos::mount::mount_to;
use std::any::Any;
use std::cell::RefCell;
use wasm_bindgen::JsCast;

thread_local! {
    static APP_MOUNT_HANDLE: RefCell<Option<Box<dyn Any>>> = RefCell::new(None);
}

fn main() {
    console_error_panic_hook::set_once();
    if let Err(e) = console_log::init_with_level(config::log_level()) {
        web_sys::console::warn_1(&format!("logger unavailable: {e}").into());
    }
    let Some(window) = web_sys::window() else {
        return;
    };
    let Some(document) = window.document() else {
        return;
    };
    let mount_target = document
        .get_element_by_id("app")
        .and_then(|node| node.dyn_into::<web_sys::HtmlElement>().ok())
        .or_else(|| document.body());
    let Some(target) = mount_target else {
        return;
    };

    APP_MOUNT_HANDLE.with(move |slot| {
        // drop a previous mount so its effects stop before the new one starts
        let _old = slot.borrow_mut().take();
        let handle = mount_to(target, app::App);
        *slot.borrow_mut() = Some(Box::new(handle));
    });
    log::info!("geodata client started");
}
