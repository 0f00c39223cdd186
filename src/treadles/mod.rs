//! Built-in treadles
//!
//! One module per generator, mirroring the spiraler treadle tags: the
//! treadle tag on each SpiralOut must match the generator name here so the
//! matrix can map (effective-type, inner-type) pairs deterministically.

mod app;
mod ddd;
mod direct;
mod foreground_service;
mod plugin;

use crate::render::camel_case;
use crate::sley::MgmtMethod;
use crate::treadle::TreadleDefinition;

/// All compiled-in treadle definitions, in registration order.
pub fn builtins() -> Vec<TreadleDefinition> {
    vec![
        foreground_service::definition(),
        direct::definition(),
        plugin::definition(),
        ddd::definition(),
        app::definition(),
    ]
}

/// Rust parameter list for a method, e.g. `bookmark: BookmarkInput`.
pub fn rust_params(method: &MgmtMethod) -> String {
    method
        .params
        .iter()
        .map(|p| format!("{}: {}", p.name, p.ty))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Tauri command wrappers for a method list.
///
/// Every command delegates to the core handle owned by the plugin state;
/// fallible methods surface their error as the command's `Err` string.
pub fn rust_command_fns(methods: &[MgmtMethod], state_type: &str) -> String {
    let mut out = String::new();
    for method in methods {
        let params = rust_params(method);
        let sep = if params.is_empty() { "" } else { ", " };
        let args = method
            .params
            .iter()
            .map(|p| p.name.clone())
            .collect::<Vec<_>>()
            .join(", ");
        let ret = if method.return_type == "void" || method.return_type == "()" {
            "()".to_string()
        } else {
            method.return_type.clone()
        };
        if let Some(description) = &method.description {
            out.push_str(&format!("/// {}\n", description));
        }
        out.push_str("#[tauri::command]\n");
        out.push_str(&format!(
            "pub async fn {}(state: tauri::State<'_, {}>{}{}) -> Result<{}, String> {{\n",
            method.name, state_type, sep, params, ret
        ));
        if method.metadata.use_result == Some(true) {
            out.push_str(&format!(
                "    state.core().{}({}).await.map_err(|e| e.to_string())\n",
                method.original_name, args
            ));
        } else {
            out.push_str(&format!(
                "    Ok(state.core().{}({}).await)\n",
                method.original_name, args
            ));
        }
        out.push_str("}\n\n");
    }
    out.trim_end().to_string()
}

/// TypeScript invoke bindings for a method list.
pub fn ts_binding_fns(methods: &[MgmtMethod], plugin_name: &str) -> String {
    let mut out = String::new();
    for method in methods {
        let params = method
            .params
            .iter()
            .map(|p| format!("{}: {}", camel_case(&p.name), p.ty))
            .collect::<Vec<_>>()
            .join(", ");
        let args = method
            .params
            .iter()
            .map(|p| camel_case(&p.name))
            .collect::<Vec<_>>()
            .join(", ");
        let ret = if method.return_type == "void" {
            "void".to_string()
        } else {
            method.return_type.clone()
        };
        out.push_str(&format!(
            "export async function {}({}): Promise<{}> {{\n",
            method.js_name, params, ret
        ));
        let payload = if args.is_empty() {
            String::new()
        } else {
            format!(", {{ {} }}", args)
        };
        out.push_str(&format!(
            "  return await invoke('plugin:{}|{}'{});\n",
            plugin_name, method.name, payload
        ));
        out.push_str("}\n\n");
    }
    out.trim_end().to_string()
}

/// Kotlin service methods delegating over the binder boundary.
pub fn kotlin_service_fns(methods: &[MgmtMethod]) -> String {
    let mut out = String::new();
    for method in methods {
        let params = method
            .params
            .iter()
            .map(|p| format!("{}: {}", camel_case(&p.name), p.ty))
            .collect::<Vec<_>>()
            .join(", ");
        let args = method
            .params
            .iter()
            .map(|p| camel_case(&p.name))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "    fun {}({}): String = runtime.dispatch(\"{}\", {})\n",
            camel_case(&method.name),
            params,
            method.name,
            if args.is_empty() { "emptyList()".to_string() } else { format!("listOf({})", args) }
        ));
    }
    out.trim_end().to_string()
}

/// Rust trait methods for a platform adaptor.
pub fn rust_trait_fns(methods: &[MgmtMethod]) -> String {
    let mut out = String::new();
    for method in methods {
        let params = rust_params(method);
        let sep = if params.is_empty() { "" } else { ", " };
        let ret = if method.return_type == "void" || method.return_type == "()" {
            "()".to_string()
        } else {
            method.return_type.clone()
        };
        if method.metadata.use_result == Some(true) {
            out.push_str(&format!(
                "    async fn {}(&self{}{}) -> anyhow::Result<{}>;\n",
                method.name, sep, params, ret
            ));
        } else {
            out.push_str(&format!(
                "    async fn {}(&self{}{}) -> {};\n",
                method.name, sep, params, ret
            ));
        }
    }
    out.trim_end().to_string()
}

/// Unwrap chain for a linked field's wrapper stack, outer to inner.
pub fn unwrap_chain(method: &MgmtMethod) -> String {
    let Some(field) = &method.metadata.field_name else {
        return String::new();
    };
    let mut expr = format!("core.{}", field);
    for wrapper in &method.metadata.wrappers {
        match wrapper.as_str() {
            "Mutex" => expr = format!("{}.lock().await", expr),
            "RwLock" => expr = format!("{}.read().await", expr),
            "Option" => expr = format!("{}.as_ref()?", expr),
            "Arc" => expr = format!("{}.clone()", expr),
            _ => {}
        }
    }
    expr
}
