//! Inline `<script>` execution backed by Boa.
//!
//! Scripts run once per load in a fresh context, before layout. The page
//! sees a tiny `document` with `write`/`writeln`; anything written is
//! appended to the body. `console.*` output goes to the `log` facade.
//! A script that throws is logged and skipped; it never fails the load.

use scraper::{ElementRef, Html};

#[cfg(feature = "scripting")]
use crate::EngineConfig;

#[cfg(feature = "scripting")]
const HARNESS: &str = r#"
var __snap_out = [];
var __snap_console = [];
var window = this;
var document = {
    write: function () {
        for (var i = 0; i < arguments.length; i++) { __snap_out.push(String(arguments[i])); }
    },
    writeln: function () {
        document.write.apply(document, arguments);
        __snap_out.push("\n");
    }
};
var console = (function () {
    function sink(level) {
        return function () {
            __snap_console.push(level + ":" + Array.prototype.join.call(arguments, " "));
        };
    }
    return { log: sink("log"), info: sink("info"), warn: sink("warn"), error: sink("error") };
})();
"#;

/// Result of running a document's scripts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutput {
    /// Markup passed to `document.write`, in call order
    pub written: String,
    /// Number of scripts that threw
    pub errors: usize,
}

/// Bodies of inline classic scripts, in document order
pub fn inline_scripts(document: &Html) -> Vec<String> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "script" && el.value().attr("src").is_none())
        .filter(|el| {
            el.value().attr("type").map_or(true, |t| {
                let t = t.trim().to_ascii_lowercase();
                t.is_empty() || t == "text/javascript" || t == "application/javascript"
            })
        })
        .map(|el| el.text().collect::<String>())
        .filter(|code| !code.trim().is_empty())
        .collect()
}

#[cfg(feature = "scripting")]
pub fn run_inline_scripts(scripts: &[String], config: &EngineConfig) -> ScriptOutput {
    use boa_engine::{Context, Source};

    let mut out = ScriptOutput::default();
    if scripts.is_empty() {
        return out;
    }

    let mut ctx = Context::default();
    if config.script_loop_iteration_limit > 0 {
        ctx.runtime_limits_mut().set_loop_iteration_limit(config.script_loop_iteration_limit);
    }
    if config.script_recursion_limit < usize::MAX {
        ctx.runtime_limits_mut().set_recursion_limit(config.script_recursion_limit);
    }
    if let Err(e) = ctx.eval(Source::from_bytes(HARNESS.as_bytes())) {
        log::error!("script harness failed to initialize: {}", e);
        out.errors = scripts.len();
        return out;
    }

    for (i, code) in scripts.iter().enumerate() {
        if let Err(e) = ctx.eval(Source::from_bytes(code.as_bytes())) {
            log::warn!("inline script #{} threw: {}", i, e);
            out.errors += 1;
        }
        drain_console(&mut ctx);
    }

    out.written = eval_string(&mut ctx, "__snap_out.join('')").unwrap_or_default();
    out
}

#[cfg(not(feature = "scripting"))]
pub fn run_inline_scripts(_scripts: &[String], _config: &crate::EngineConfig) -> ScriptOutput {
    ScriptOutput::default()
}

#[cfg(feature = "scripting")]
fn eval_string(ctx: &mut boa_engine::Context, code: &str) -> Option<String> {
    let value = ctx.eval(boa_engine::Source::from_bytes(code.as_bytes())).ok()?;
    value.as_string().map(|s| s.to_std_string_escaped())
}

#[cfg(feature = "scripting")]
fn drain_console(ctx: &mut boa_engine::Context) {
    let Some(lines) = eval_string(ctx, "__snap_console.splice(0, __snap_console.length).join('\\n')") else {
        return;
    };
    for line in lines.lines().filter(|l| !l.is_empty()) {
        let (level, text) = line.split_once(':').unwrap_or(("log", line));
        match level {
            "error" => log::error!(target: "htmlsnap::console", "{}", text),
            "warn" => log::warn!(target: "htmlsnap::console", "{}", text),
            "info" => log::info!(target: "htmlsnap::console", "{}", text),
            _ => log::debug!(target: "htmlsnap::console", "{}", text),
        }
    }
}
