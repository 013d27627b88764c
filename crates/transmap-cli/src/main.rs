//! Transmap CLI - map documents between schema types

mod config;
mod document;
mod errors;

use anyhow::{Context, Result, anyhow, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use config::Config;
use document::OutputFormat;
use rhi_transmap_core::{
    ConfigError, ConverterRegistry, MapConfig, Mapper, PlanError, Profile, Schema, Ty, TypeKind,
    Value, render_plan,
};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Parse a type expression such as `Customer`, `Vec<Order>` or `Option<i32>`.
fn parse_ty(s: &str) -> Result<Ty, String> {
    s.parse().map_err(|e: rhi_transmap_core::TyParseError| e.to_string())
}

/// Output verbosity level.
#[derive(Clone, Copy)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    /// Status messages go to stderr so documents on stdout stay clean.
    fn info(self, msg: &str) {
        if !matches!(self, Verbosity::Quiet) {
            eprintln!("{msg}");
        }
    }

    fn debug(self, msg: &str) {
        if matches!(self, Verbosity::Verbose) {
            eprintln!("[debug] {msg}");
        }
    }

    fn result(self, msg: &str) {
        if !matches!(self, Verbosity::Quiet) {
            println!("{msg}");
        }
    }
}

#[derive(Parser)]
#[command(name = "transmap")]
#[command(about = "Compiled mappings between object graphs", long_about = None)]
struct Cli {
    /// Verbose output (show debug info)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to config file (default: ~/.config/transmap/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the types a schema defines
    Types {
        /// Schema file (YAML, TOML, or JSON)
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// List builtin converters
    Converters,

    /// Show the operations planned for a type pair
    Plan {
        /// Schema file (YAML, TOML, or JSON)
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Rule profile applied to the mapping
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Source type
        #[arg(long, value_parser = parse_ty)]
        from: Ty,
        /// Destination type
        #[arg(long, value_parser = parse_ty)]
        to: Ty,
    },

    /// Map a document from one type to another
    Map {
        /// Input document, JSON or YAML (use "-" for stdin)
        #[arg(default_value = "-")]
        input: String,
        /// Schema file (YAML, TOML, or JSON)
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Rule profile applied to the mapping
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Source type
        #[arg(long, value_parser = parse_ty)]
        from: Ty,
        /// Destination type
        #[arg(long, value_parser = parse_ty)]
        to: Ty,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format (default: from the output extension, else json)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
        /// Treat the input as a list and map each element on its own
        #[arg(long)]
        each: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = if let Some(ref path) = cli.config {
        Config::load_from_path(Some(path.clone()))
    } else {
        Config::load()
    };

    let verbose = cli.verbose || config.defaults.verbose;
    let quiet = cli.quiet || config.defaults.quiet;
    let verbosity = Verbosity::from_flags(verbose, quiet);

    match cli.command {
        Commands::Types { schema } => {
            let schema = load_schema(&schema_path(schema, &config)?)?;
            cmd_types(&schema, verbosity)
        }
        Commands::Converters => cmd_converters(verbosity),
        Commands::Plan {
            schema,
            profile,
            from,
            to,
        } => {
            let mapper = load_mapper(schema, profile, &config, verbosity)?;
            cmd_plan(&mapper, &from, &to, verbosity)
        }
        Commands::Map {
            input,
            schema,
            profile,
            from,
            to,
            output,
            format,
            each,
        } => {
            let mapper = load_mapper(schema, profile, &config, verbosity)?;
            let format = format
                .or_else(|| output.as_deref().and_then(format_from_path))
                .or(config.defaults.format)
                .unwrap_or_default();
            cmd_map(&mapper, &input, &from, &to, output.as_deref(), format, each, verbosity)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "transmap", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Install the log subscriber. `RUST_LOG` takes precedence over `--verbose`.
fn init_tracing(verbose: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if verbose { "debug" } else { "warn" })
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn schema_path(schema: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    schema.or_else(|| config.defaults.schema.clone()).context(
        "No schema given. Use --schema FILE or set `schema` under [defaults] in the config file",
    )
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| anyhow!(errors::file_read_error(path, &e)))
}

fn load_schema(path: &Path) -> Result<Schema> {
    let data = read_file(path)?;
    Schema::from_bytes(&data, path.to_str())
        .with_context(|| format!("Invalid schema file '{}'", path.display()))
}

/// Build a mapper from a schema and an optional rule profile.
fn load_mapper(
    schema: Option<PathBuf>,
    profile: Option<PathBuf>,
    config: &Config,
    v: Verbosity,
) -> Result<Mapper> {
    let schema_path = schema_path(schema, config)?;
    let mapper = Mapper::new(load_schema(&schema_path)?);
    v.debug(&format!(
        "Loaded {} types from {}",
        mapper.schema().len(),
        schema_path.display()
    ));

    let Some(profile_path) = profile.or_else(|| config.defaults.profile.clone()) else {
        return Ok(mapper);
    };
    let data = read_file(&profile_path)?;
    let profile = Profile::from_bytes(&data, profile_path.to_str())
        .with_context(|| format!("Invalid profile '{}'", profile_path.display()))?;
    profile
        .check(mapper.schema())
        .with_context(|| format!("Profile '{}' does not fit the schema", profile_path.display()))?;

    let builder = MapConfig::builder()
        .apply_profile(&profile)
        .map_err(|e| match e {
            ConfigError::UnknownConverter(id) => {
                anyhow!(errors::unknown_converter_error(&id, &ConverterRegistry::with_builtins()))
            }
            other => other.into(),
        })?;
    v.debug(&format!(
        "Applied {} rules from {}",
        profile.rules.len(),
        profile_path.display()
    ));
    Ok(mapper.with_config(builder.build()))
}

/// Fail early, with suggestions, on types the schema does not define.
fn check_type(ty: &Ty, schema: &Schema) -> Result<()> {
    if errors::undefined_name(ty, schema).is_some() {
        bail!(errors::unknown_type_error(ty, schema));
    }
    Ok(())
}

fn format_from_path(path: &Path) -> Option<OutputFormat> {
    match path.extension()?.to_str()?.to_lowercase().as_str() {
        "json" => Some(OutputFormat::Json),
        "yaml" | "yml" => Some(OutputFormat::Yaml),
        _ => None,
    }
}

fn cmd_types(schema: &Schema, v: Verbosity) -> Result<()> {
    for desc in schema.types() {
        match &desc.kind {
            TypeKind::Object(obj) => {
                let note = if obj.constructible { "" } else { ", abstract" };
                v.result(&format!("{} (object{})", desc.name, note));
                for member in &obj.members {
                    let access = match (member.readable, member.writable) {
                        (true, false) => " [read-only]",
                        (false, true) => " [write-only]",
                        _ => "",
                    };
                    v.result(&format!("  {}: {}{}", member.name, member.ty, access));
                }
            }
            TypeKind::Enum(e) => {
                v.result(&format!("{} (enum {})", desc.name, e.underlying));
                for (variant, discriminant) in &e.variants {
                    v.result(&format!("  {} = {}", variant, discriminant));
                }
            }
        }
    }

    v.info(&format!("Total: {} types", schema.len()));
    Ok(())
}

fn cmd_converters(v: Verbosity) -> Result<()> {
    let registry = ConverterRegistry::with_builtins();
    for decl in registry.declarations() {
        v.result(&format!("  {}", decl.id));
        if !decl.description.is_empty() {
            v.debug(&format!("    {}", decl.description));
        }
    }

    v.info(&format!("Total: {} converters", registry.len()));
    Ok(())
}

fn cmd_plan(mapper: &Mapper, from: &Ty, to: &Ty, v: Verbosity) -> Result<()> {
    check_type(from, mapper.schema())?;
    check_type(to, mapper.schema())?;

    let ops = match mapper.plan(from, to) {
        Ok(ops) => ops,
        Err(PlanError::NotAnObject(_)) => {
            // Scalar and collection pairs have no member operations.
            mapper
                .transformer(from, to)
                .with_context(|| format!("Cannot map {} to {}", from, to))?;
            v.result(&format!("{} -> {} (no member operations)", from, to));
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("Cannot plan {} to {}", from, to)),
    };

    v.result(&format!("{} -> {}", from, to));
    v.result(render_plan(&ops).trim_end());

    let transformer = mapper
        .transformer(from, to)
        .with_context(|| format!("Cannot compile {} to {}", from, to))?;
    v.debug(&format!(
        "Compiled transformer (config {}, {} cached)",
        transformer.config_id(),
        mapper.cache().len()
    ));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_map(
    mapper: &Mapper,
    input: &str,
    from: &Ty,
    to: &Ty,
    output: Option<&Path>,
    format: OutputFormat,
    each: bool,
    v: Verbosity,
) -> Result<()> {
    check_type(from, mapper.schema())?;
    check_type(to, mapper.schema())?;

    let data = if input == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        read_file(Path::new(input))?
    };
    let doc = document::parse(&data)?;
    let transformer = mapper
        .transformer(from, to)
        .with_context(|| format!("Cannot map {} to {}", from, to))?;
    debug!(from = %from, to = %to, each, "mapping document");

    let mapped = if each {
        let serde_json::Value::Array(items) = &doc else {
            bail!("--each expects a list document");
        };
        let sources = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                document::read(mapper.schema(), from, item)
                    .with_context(|| format!("Invalid input item {}", i))
            })
            .collect::<Result<Vec<_>>>()?;
        v.debug(&format!("Mapping {} items", sources.len()));
        Value::List(map_each(&transformer, &sources)?)
    } else {
        let source = document::read(mapper.schema(), from, &doc).context("Invalid input document")?;
        transformer.map(&source)?
    };

    let rendered = document::render(&document::write(&mapped), format)?;
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            v.info(&format!("Wrote {}", path.display()));
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[cfg(feature = "parallel")]
fn map_each(transformer: &rhi_transmap_core::Transformer, sources: &[Value]) -> Result<Vec<Value>> {
    Ok(transformer.par_map_all(sources)?)
}

#[cfg(not(feature = "parallel"))]
fn map_each(transformer: &rhi_transmap_core::Transformer, sources: &[Value]) -> Result<Vec<Value>> {
    Ok(transformer.map_all(sources)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ty() {
        assert_eq!(parse_ty("Vec<Order>"), Ok(Ty::list(Ty::named("Order"))));
        assert!(parse_ty("Vec<>").is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(format_from_path(Path::new("out.yml")), Some(OutputFormat::Yaml));
        assert_eq!(format_from_path(Path::new("out.JSON")), Some(OutputFormat::Json));
        assert_eq!(format_from_path(Path::new("out")), None);
    }
}
