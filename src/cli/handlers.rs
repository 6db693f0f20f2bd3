// FILE: src/cli/handlers.rs
use crate::{
    cli::OutputFormat, compile_dir_with_options, resolve_reference, Compilation, CompilationStats,
    CompilerError, FuncMap, Result, LOCAL_SEPARATOR, SECTION_SEPARATOR,
};

use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::Path;

fn compile(cli: &super::EnhancedCli, matches: &clap::ArgMatches) -> Result<Compilation> {
    let dir = cli.source_dir(matches)?;
    let options = cli.build_compiler_options(matches)?;
    log::info!("Compiling components in {}", dir.display());
    compile_dir_with_options(&dir, FuncMap::new(), &options)
}

/// Accept `home` as well as `./home`.
fn page_name(page: &str) -> String {
    resolve_reference("", page)
}

// --- CHECK ---
pub fn handle_check_command(cli: &super::EnhancedCli, matches: &clap::ArgMatches) -> Result<()> {
    let dir = cli.source_dir(matches)?;
    println!("🔍 Checking {}", dir.display());

    let compilation = match compile(cli, matches) {
        Ok(compilation) => compilation,
        Err(e) => {
            println!("❌ {}", e);
            return Err(e);
        }
    };

    match matches.get_one::<OutputFormat>("format").copied().unwrap_or(OutputFormat::Text) {
        OutputFormat::Text => {
            println!("✅ Compilation successful!");
            print_stats(&compilation.stats);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&compilation.stats).map_err(|e| {
                CompilerError::InvalidFormat {
                    message: format!("JSON serialization error: {}", e),
                }
            })?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn print_stats(stats: &CompilationStats) {
    println!("\n📊 Compilation Statistics:");
    println!("   Documents: {}", stats.document_count);
    println!("   Fragments: {}", stats.fragment_count);
    println!("   Page roots: {}", stats.root_count);
    println!("   Dependency edges: {}", stats.edge_count);
    println!("   Time: {}ms", stats.compile_time_ms);
}

// --- LIST ---
pub fn handle_list_command(cli: &super::EnhancedCli, matches: &clap::ArgMatches) -> Result<()> {
    let compilation = compile(cli, matches)?;
    let pages_only = matches.get_flag("pages");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for name in compilation.registry.names() {
        if pages_only && name.contains([SECTION_SEPARATOR, LOCAL_SEPARATOR]) {
            continue;
        }
        writeln!(out, "{}", name).map_err(|e| CompilerError::io("<stdout>", e))?;
    }
    Ok(())
}

// --- RENDER ---
pub fn handle_render_command(cli: &super::EnhancedCli, matches: &clap::ArgMatches) -> Result<()> {
    let page = matches
        .get_one::<String>("page")
        .map(|p| page_name(p))
        .ok_or_else(|| CompilerError::InvalidFormat {
            message: "No page given".to_string(),
        })?;
    let data = match cli.data_file(matches) {
        Some(path) => load_data(&path)?,
        None => Value::Null,
    };

    let compilation = compile(cli, matches)?;
    let registry = &compilation.registry;

    match matches.get_one::<String>("output") {
        Some(output_path) => {
            let mut file =
                fs::File::create(output_path).map_err(|e| CompilerError::io(output_path, e))?;
            registry.render_to(&page, &data, &mut file)?;
            println!("✅ Rendered {} -> {} ({}ms)", page, output_path, cli.elapsed_ms());
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            registry.render_to(&page, &data, &mut out)?;
            out.flush().map_err(|e| CompilerError::io("<stdout>", e))?;
        }
    }
    Ok(())
}

fn load_data(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| CompilerError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| CompilerError::InvalidFormat {
        message: format!("Invalid JSON data in {}: {}", path.display(), e),
    })
}

// --- DEPS ---
pub fn handle_deps_command(cli: &super::EnhancedCli, matches: &clap::ArgMatches) -> Result<()> {
    let page = matches
        .get_one::<String>("page")
        .map(|p| page_name(p))
        .ok_or_else(|| CompilerError::InvalidFormat {
            message: "No page given".to_string(),
        })?;

    let compilation = compile(cli, matches)?;
    if !compilation.graph.contains(&page) {
        return Err(CompilerError::render(page.clone(), format!("no such page {:?}", page)));
    }
    let order = crate::sorted_closure(&compilation.graph, &page)?;

    match matches.get_one::<OutputFormat>("format").copied().unwrap_or(OutputFormat::Text) {
        OutputFormat::Text => {
            println!("📦 {} includes {} component(s):", page, order.len());
            for (i, member) in order.iter().enumerate() {
                let marker = if compilation.graph.contains(member) { "" } else { " (missing)" };
                println!("   {}. {}{}", i + 1, member, marker);
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&order).map_err(|e| {
                CompilerError::InvalidFormat {
                    message: format!("JSON serialization error: {}", e),
                }
            })?;
            println!("{}", json);
        }
    }
    Ok(())
}
