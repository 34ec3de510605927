//! Script composition: bootstrap, rendered directives and the caller's script.
//!
//! The caller's script is inserted byte for byte as a single segment: line
//! endings, including `\r\n` inside template literals, are kept. It is not
//! escaped or inspected; the runtime's sandbox limits what the script can do,
//! not what it looks like.

use std::fmt;

use crate::error::{Result, SandboxError};
use crate::sandbox::directives::{Directive, DirectivePlan};
use crate::sandbox::permissions::WhitelistItem;

/// Default module path of the gas-fakes runtime, relative to the artifact.
pub const DEFAULT_RUNTIME_ENTRY: &str = "./node_modules/@mcpher/gas-fakes/main.js";

/// Variable the directives use to reach the runtime's sandbox behavior.
const BEHAVIOR: &str = "behavior";

/// How the composed script loads the sandbox runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    /// Module specifier imported on the first line.
    pub runtime_entry: String,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self {
            runtime_entry: DEFAULT_RUNTIME_ENTRY.to_string(),
        }
    }
}

impl Bootstrap {
    pub fn new(runtime_entry: impl Into<String>) -> Self {
        Self {
            runtime_entry: runtime_entry.into(),
        }
    }

    fn render(&self) -> Result<Vec<String>> {
        Ok(vec![
            format!("import {};", js_string(&self.runtime_entry)?),
            format!("const {BEHAVIOR} = ScriptApp.__behavior;"),
        ])
    }
}

/// A fully composed script, ready to be written to an artifact.
///
/// Segments are joined with `\n`. Every generated segment is one line; the
/// caller's script is one segment however many lines it spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedScript {
    segments: Vec<String>,
}

impl ComposedScript {
    /// Compose the bootstrap, the plan's directives and the caller's script.
    pub fn compose(bootstrap: &Bootstrap, plan: &DirectivePlan, script: &str) -> Result<Self> {
        let mut segments = bootstrap.render()?;
        for directive in &plan.preamble {
            segments.push(render_directive(directive)?);
        }

        segments.push(String::new());
        segments.push(script.to_string());
        segments.push(String::new());

        if let Some(trailer) = &plan.trailer {
            segments.push(render_directive(trailer)?);
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Render the script text.
    pub fn render(&self) -> String {
        let mut text = self.segments.join("\n");
        text.push('\n');
        text
    }
}

impl fmt::Display for ComposedScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Render one directive as a single line of JavaScript.
pub fn render_directive(directive: &Directive) -> Result<String> {
    let line = match directive {
        Directive::EnableSandbox => format!("{BEHAVIOR}.sandboxMode = true;"),
        Directive::SetStrictSandbox(strict) => format!("{BEHAVIOR}.strictSandbox = {strict};"),
        Directive::SetCleanupPolicy(cleanup) => format!("{BEHAVIOR}.cleanup = {cleanup};"),
        Directive::SetWhitelist(items) => {
            let items = items
                .iter()
                .map(render_whitelist_item)
                .collect::<Result<Vec<_>>>()?;
            format!("{BEHAVIOR}.setIdWhitelist([{}]);", items.join(", "))
        }
        Directive::SetServiceControl {
            service,
            field,
            value,
        } => format!(
            "{BEHAVIOR}.sandboxService.{service}.{} = {value};",
            field.property()
        ),
        Directive::ResetMethodWhitelist { service } => {
            format!("{BEHAVIOR}.sandboxService.{service}.clearMethodWhitelist();")
        }
        Directive::AddMethodWhitelist { service, method } => format!(
            "{BEHAVIOR}.sandboxService.{service}.addMethodWhitelist({});",
            js_string(method)?
        ),
        Directive::TrashSessionFiles => format!("{BEHAVIOR}.trash();"),
    };
    Ok(line)
}

fn render_whitelist_item(item: &WhitelistItem) -> Result<String> {
    let mut rendered = format!("{BEHAVIOR}.newIdWhitelistItem({})", js_string(&item.id)?);
    if let Some(read) = item.read {
        rendered.push_str(&format!(".setRead({read})"));
    }
    if let Some(write) = item.write {
        rendered.push_str(&format!(".setWrite({write})"));
    }
    if let Some(trash) = item.trash {
        rendered.push_str(&format!(".setTrash({trash})"));
    }
    Ok(rendered)
}

/// Encode `value` as a string literal. JSON strings are valid JavaScript strings.
fn js_string(value: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| SandboxError::Composition(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::permissions::SandboxConfig;

    fn compose(config: &SandboxConfig, script: &str) -> ComposedScript {
        let plan = DirectivePlan::build(config).unwrap();
        ComposedScript::compose(&Bootstrap::default(), &plan, script).unwrap()
    }

    #[test]
    fn test_default_composition() {
        let script = compose(&SandboxConfig::default(), "console.log(\"hi\")");
        assert_eq!(
            script.render(),
            "import \"./node_modules/@mcpher/gas-fakes/main.js\";\n\
             const behavior = ScriptApp.__behavior;\n\
             behavior.sandboxMode = true;\n\
             \n\
             console.log(\"hi\")\n\
             \n\
             behavior.trash();\n"
        );
    }

    #[test]
    fn test_no_trailer_without_sandbox() {
        let config = SandboxConfig {
            sandbox_enabled: false,
            ..Default::default()
        };
        let script = compose(&config, "main();");
        assert!(!script.render().contains("behavior.trash()"));
        assert!(!script.render().contains("sandboxMode"));
        assert_eq!(script.segments().last().map(String::as_str), Some(""));
    }

    #[test]
    fn test_whitelist_rendering() {
        let config = SandboxConfig {
            whitelist: vec![
                WhitelistItem::new("abc").read(true).write(false),
                WhitelistItem::new("def").trash(true),
            ],
            ..Default::default()
        };
        let script = compose(&config, "");
        assert!(script.segments().contains(
            &"behavior.setIdWhitelist([behavior.newIdWhitelistItem(\"abc\").setRead(true).setWrite(false), \
              behavior.newIdWhitelistItem(\"def\").setTrash(true)]);"
                .to_string()
        ));
    }

    #[test]
    fn test_method_whitelist_rendering() {
        let mut config = SandboxConfig::default();
        config.method_whitelists.set("DriveApp", ["getFiles"]);
        let script = compose(&config, "");

        let segments = script.segments();
        let reset = segments
            .iter()
            .position(|l| l == "behavior.sandboxService.DriveApp.clearMethodWhitelist();")
            .unwrap();
        assert_eq!(
            segments[reset + 1],
            "behavior.sandboxService.DriveApp.addMethodWhitelist(\"getFiles\");"
        );
        assert_eq!(
            segments.iter().filter(|l| l.contains("addMethodWhitelist")).count(),
            1
        );
    }

    #[test]
    fn test_literals_are_escaped() {
        let config = SandboxConfig {
            whitelist: vec![WhitelistItem::new("a\"); process.exit(1); (\"")],
            ..Default::default()
        };
        let script = compose(&config, "");
        assert!(script
            .render()
            .contains(r#"newIdWhitelistItem("a\"); process.exit(1); (\"")"#));
    }

    #[test]
    fn test_script_inserted_verbatim() {
        let body = "function sample() {\n  console.log(`a ${1}`);\n}\nsample();";
        let script = compose(&SandboxConfig::default(), body);
        assert!(script.render().contains(body));
    }

    #[test]
    fn test_script_line_endings_preserved() {
        let body = "const s = `a\r\nb`;\r\nconsole.log(s);\n";
        let script = compose(&SandboxConfig::default(), body);
        assert!(script.render().contains(&format!("\n{body}\n")));

        let without_newline = compose(&SandboxConfig::default(), "x();");
        let with_newline = compose(&SandboxConfig::default(), "x();\n");
        assert_ne!(without_newline.render(), with_newline.render());
    }

    #[test]
    fn test_composition_is_deterministic() {
        let mut config = SandboxConfig {
            strict_sandbox: Some(true),
            whitelist: vec![WhitelistItem::new("abc")],
            ..Default::default()
        };
        config.method_whitelists.set("DriveApp", ["getFiles", "getFolders"]);

        let first = compose(&config, "sample();");
        let second = compose(&config, "sample();");
        assert_eq!(first.render(), second.render());
    }
}
