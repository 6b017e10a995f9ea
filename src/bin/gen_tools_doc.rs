//! Render the tool registry as `docs/TOOLS.md`.

use decomp_mcp::bridge::worker::{DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS};
use decomp_mcp::{ToolCategory, ToolInfo, TOOL_REGISTRY};
use std::fmt::Write as _;

fn category_title(cat: ToolCategory) -> &'static str {
    match cat {
        ToolCategory::Core => "Discovery",
        ToolCategory::Functions => "Functions",
        ToolCategory::Decompile => "Decompilation",
        ToolCategory::Xrefs => "References",
        ToolCategory::Editing => "Annotations",
    }
}

fn render_tool(out: &mut String, tool: &ToolInfo) -> std::fmt::Result {
    writeln!(out, "### `{}`\n", tool.name)?;
    writeln!(out, "{}\n", tool.full_desc)?;
    writeln!(out, "```json\n{}\n```\n", tool.example)?;
    if !tool.keywords.is_empty() {
        writeln!(out, "Search terms: {}\n", tool.keywords.join(", "))?;
    }
    Ok(())
}

fn render() -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(out, "# decomp-mcp tools\n")?;
    writeln!(
        out,
        "> Generated from `src/tool_registry.rs` by `cargo run --bin gen_tools_doc -- docs/TOOLS.md`.\n"
    )?;
    writeln!(
        out,
        "Every tool call becomes one request to the analysis backend named by \
         `backend_addr` (`--backend`, `DECOMP_MCP_BACKEND`). Calls wait {DEFAULT_TIMEOUT_SECS} s \
         for a reply by default, at most {MAX_TIMEOUT_SECS} s (`--timeout-secs`, \
         `DECOMP_MCP_TIMEOUT`). Failures come back as error results carrying the \
         backend's own message.\n"
    )?;

    writeln!(out, "| Category | Tools |")?;
    writeln!(out, "|----------|-------|")?;
    for &cat in ToolCategory::all() {
        let names: Vec<String> = TOOL_REGISTRY
            .iter()
            .filter(|t| t.category == cat)
            .map(|t| format!("`{}`", t.name))
            .collect();
        writeln!(out, "| {} (`{}`) | {} |", category_title(cat), cat.as_str(), names.join(", "))?;
    }
    writeln!(out)?;

    for &cat in ToolCategory::all() {
        writeln!(out, "## {}\n", category_title(cat))?;
        writeln!(out, "{}.\n", cat.description())?;
        for tool in TOOL_REGISTRY.iter().filter(|t| t.category == cat) {
            render_tool(&mut out, tool)?;
        }
    }

    writeln!(out, "## Arguments\n")?;
    writeln!(
        out,
        "- A function identifier that parses as hex (`0x401000`, `deadbeef`) is an address; \
         anything else is a function name. Zero, negative and over-64-bit values are rejected."
    )?;
    writeln!(
        out,
        "- `page` is 1-indexed; `page` and `page_size` accept numbers or numeric strings."
    )?;
    writeln!(
        out,
        "- `rename_variables` applies renames in the order given and stops at the first failure."
    )?;
    Ok(out)
}

fn main() {
    let out = match render() {
        Ok(out) => out,
        Err(err) => {
            eprintln!("failed to render tool docs: {err}");
            std::process::exit(1);
        }
    };

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        if let Err(err) = std::fs::write(&args[1], out) {
            eprintln!("failed to write {}: {}", args[1], err);
            std::process::exit(1);
        }
    } else {
        print!("{out}");
    }
}
