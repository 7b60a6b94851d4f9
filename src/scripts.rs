//! JavaScript evaluated inside capture sessions.
//!
//! Readiness checks return a plain boolean. Anything structured comes back as a
//! `JSON.stringify`-ed string and is parsed on the Rust side. Literals are
//! embedded JSON-encoded so selectors and markup cannot break out of the
//! expression.

/// Encode `s` as a JavaScript string literal
pub fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_owned()).to_string()
}

/// True once the structural DOM has been parsed
pub fn document_parsed() -> String {
    "document.readyState !== 'loading'".to_string()
}

/// Every sub-resource of the current document, stylesheets included, loaded
pub fn document_complete() -> String {
    "document.readyState === 'complete'".to_string()
}

pub fn root_present(root_selector: &str) -> String {
    format!("document.querySelector({}) !== null", js_str(root_selector))
}

pub fn ready_attribute(root_selector: &str, attribute: &str, value: &str) -> String {
    format!(
        "(function(){{ const el = document.querySelector({}); return !!el && el.getAttribute({}) === {}; }})()",
        js_str(root_selector),
        js_str(attribute),
        js_str(value)
    )
}

pub fn fonts_loaded() -> String {
    "(!document.fonts || document.fonts.status === 'loaded')".to_string()
}

/// The logo image finished loading and has intrinsic dimensions
pub fn logo_loaded(image_selector: &str) -> String {
    format!(
        "(function(){{ const img = document.querySelector({}); return !!img && img.complete && img.naturalWidth > 0 && img.naturalHeight > 0; }})()",
        js_str(image_selector)
    )
}

/// The highlighted code preview has been filled in by its formatter
pub fn code_block_rendered(code_selector: &str) -> String {
    format!(
        "(function(){{ const el = document.querySelector({}); return !!el && el.innerHTML.trim().length > 0; }})()",
        js_str(code_selector)
    )
}

/// Collect head stylesheets, inline styles, the root markup and the custom
/// properties set inline on `<html>`.
pub fn extract_snapshot(root_selector: &str) -> String {
    format!(
        r#"(function(){{
    const head = document.head;
    const links = head ? Array.from(head.querySelectorAll('link[rel="stylesheet"]')).map(function(l){{ return l.outerHTML; }}) : [];
    const styles = head ? Array.from(head.querySelectorAll('style')).map(function(s){{ return s.outerHTML; }}) : [];
    const root = document.querySelector({});
    const inline = document.documentElement.style;
    const vars = [];
    for (let i = 0; i < inline.length; i++) {{
        const name = inline[i];
        if (name.indexOf('--') === 0) {{
            vars.push(name + ': ' + inline.getPropertyValue(name).trim() + ';');
        }}
    }}
    return JSON.stringify({{
        stylesheetLinks: links,
        inlineStyles: styles,
        rootMarkup: root ? root.outerHTML : null,
        rootVariables: vars.join(' ')
    }});
}})()"#,
        js_str(root_selector)
    )
}

/// Replace the whole document with `html`
pub fn replace_document(html: &str) -> String {
    format!(
        "(function(){{ document.open(); document.write({}); document.close(); return true; }})()",
        js_str(html)
    )
}

/// Scroll height of the root element, or of the whole document when the root
/// is missing.
pub fn content_height(root_selector: &str) -> String {
    format!(
        r#"(function(){{
    const el = document.querySelector({});
    if (el) return JSON.stringify({{ height: el.scrollHeight, fromRoot: true }});
    const body = document.body ? document.body.scrollHeight : 0;
    return JSON.stringify({{ height: Math.max(body, document.documentElement.scrollHeight), fromRoot: false }});
}})()"#,
        js_str(root_selector)
    )
}

/// Bottom-right corner of the element in document coordinates, or `null`
pub fn element_extent(selector: &str) -> String {
    format!(
        "(function(){{ const el = document.querySelector({}); if (!el) return null; const r = el.getBoundingClientRect(); return JSON.stringify({{ right: Math.ceil(r.right + window.scrollX), bottom: Math.ceil(r.bottom + window.scrollY) }}); }})()",
        js_str(selector)
    )
}

/// Antialiasing and image-rendering overrides applied before a screenshot
pub fn inject_quality_styles() -> String {
    let css = "* { -webkit-font-smoothing: antialiased; -moz-osx-font-smoothing: grayscale; text-rendering: geometricPrecision; } \
               img, svg { image-rendering: -webkit-optimize-contrast; image-rendering: high-quality; }";
    format!(
        "(function(){{ const s = document.createElement('style'); s.setAttribute('data-docshot', 'quality'); s.textContent = {}; (document.head || document.documentElement).appendChild(s); return true; }})()",
        js_str(css)
    )
}
