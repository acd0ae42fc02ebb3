//! WebGL Shield - Main Entry Point
//!
//! Command-line front end: loads configuration, initializes a session against
//! the software host and prints scripts, status or a probe of spoofed values.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use webgl_shield::{
    config::{CliArgs, GpuTier, GpuVendor, ShieldConfig},
    host::{gl, ContextProvider, PixelBuffer, SoftwareHost},
    stealth::{preload_script, protection_script, Shield},
    NAME, VERSION,
};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
}

/// Print the startup banner with version
fn print_banner() {
    println!(
        "{cyan}{bold}webgl-shield{reset} {dim}v{version} - deterministic WebGL fingerprint protection{reset}\n",
        cyan = colors::CYAN,
        bold = colors::BOLD,
        reset = colors::RESET,
        dim = colors::DIM,
        version = VERSION
    );
}

fn on_off(enabled: bool) -> String {
    if enabled {
        format!("{green}enabled{reset}", green = colors::GREEN, reset = colors::RESET)
    } else {
        format!("{yellow}disabled{reset}", yellow = colors::YELLOW, reset = colors::RESET)
    }
}

/// Print configuration summary
fn print_config_summary(shield: &Shield) {
    let config = shield.config();
    let profile = shield.profile();
    println!("{bold}Configuration:{reset}", bold = colors::BOLD, reset = colors::RESET);
    println!(
        "  {dim}Seed:{reset}           {}",
        shield.generator().seed(),
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}Profile:{reset}        {} ({} {})",
        profile.unmasked_renderer,
        profile.gpu_vendor(),
        profile.gpu_tier(),
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}Parameters:{reset}     {}",
        on_off(config.parameters.enabled),
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}Extensions:{reset}     {}",
        on_off(config.extensions.enabled),
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}Draw calls:{reset}     {}",
        on_off(config.draw_calls.enabled),
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}Readback:{reset}       {}",
        on_off(config.readback.enabled),
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!();
}

/// Build the CLI command parser
fn build_cli() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .about("Deterministic WebGL fingerprint protection")
        .long_about(
            "webgl-shield answers WebGL identity, capability and pixel queries from a\n\
             synthetic, seed-consistent GPU profile. This tool can:\n\
             - Print the injectable protection or preload script\n\
             - Print the session status as JSON\n\
             - Probe the spoofed values against an in-memory host",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file (TOML or JSON)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("VALUE")
                .help("Session seed (integer or text)"),
        )
        .arg(
            Arg::new("catalog")
                .long("catalog")
                .value_name("FILE")
                .help("Path to a JSON profile catalog")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("vendor")
                .long("vendor")
                .value_name("VENDOR")
                .help("Preferred GPU vendor: nvidia, amd or intel")
                .value_parser(clap::value_parser!(GpuVendor)),
        )
        .arg(
            Arg::new("tier")
                .long("tier")
                .value_name("TIER")
                .help("Preferred GPU tier: high, mid or low")
                .value_parser(clap::value_parser!(GpuTier)),
        )
        .arg(
            Arg::new("origin")
                .long("origin")
                .value_name("URL")
                .help("Page origin, used to select compatibility mode"),
        )
        .arg(
            Arg::new("draw-calls")
                .long("draw-calls")
                .help("Enable draw-call noise injection")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("disable")
                .long("disable")
                .help("Turn the master switch off")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Enable protection diagnostics")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("script")
                .long("script")
                .help("Print the protection script for this session")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("preload")
                .long("preload")
                .help("Print the minimal preload script")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("status")
                .long("status")
                .help("Print the session status as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("probe")
                .long("probe")
                .help("Create a protected context on the software host and print spoofed values")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress output except errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
}

/// Parse CLI arguments into CliArgs struct
fn parse_cli_args(matches: &clap::ArgMatches) -> CliArgs {
    let mut args = CliArgs::default();

    args.config_file = matches.get_one::<PathBuf>("config").cloned();
    args.seed = matches.get_one::<String>("seed").cloned();
    args.profile_path = matches.get_one::<PathBuf>("catalog").cloned();
    args.preferred_vendor = matches.get_one::<GpuVendor>("vendor").copied();
    args.preferred_tier = matches.get_one::<GpuTier>("tier").copied();

    if matches.get_flag("draw-calls") {
        args.draw_calls = Some(true);
    }
    if matches.get_flag("disable") {
        args.enabled = Some(false);
    }
    if matches.get_flag("debug") {
        args.debug = Some(true);
    }

    args
}

/// Initialize the tracing/logging subsystem
fn init_tracing(verbosity: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Runs one context through the shielded provider and prints what a page sees.
fn probe(shield: &Shield) {
    let provider = shield.provider();
    let Some(mut context) = provider.get_context("webgl").and_then(|c| c.into_gl()) else {
        println!("No WebGL context available");
        return;
    };

    println!("{bold}Probe (webgl):{reset}", bold = colors::BOLD, reset = colors::RESET);
    let queries = [
        ("VENDOR", gl::VENDOR),
        ("RENDERER", gl::RENDERER),
        ("UNMASKED_VENDOR_WEBGL", gl::UNMASKED_VENDOR_WEBGL),
        ("UNMASKED_RENDERER_WEBGL", gl::UNMASKED_RENDERER_WEBGL),
        ("VERSION", gl::VERSION),
        ("MAX_TEXTURE_SIZE", gl::MAX_TEXTURE_SIZE),
        ("MAX_VIEWPORT_DIMS", gl::MAX_VIEWPORT_DIMS),
        ("MAX_RENDERBUFFER_SIZE", gl::MAX_RENDERBUFFER_SIZE),
        ("ALIASED_POINT_SIZE_RANGE", gl::ALIASED_POINT_SIZE_RANGE),
        ("MAX_VERTEX_UNIFORM_VECTORS", gl::MAX_VERTEX_UNIFORM_VECTORS),
    ];
    for (name, pname) in queries {
        println!(
            "  {dim}{:<28}{reset} {}",
            name,
            context.get_parameter(pname),
            dim = colors::DIM,
            reset = colors::RESET
        );
    }

    if let Some(format) = context.get_shader_precision_format(gl::FRAGMENT_SHADER, gl::HIGH_FLOAT) {
        println!(
            "  {dim}{:<28}{reset} {:?}",
            "HIGH_FLOAT (fragment)",
            format,
            dim = colors::DIM,
            reset = colors::RESET
        );
    }

    let extensions = context.get_supported_extensions().unwrap_or_default();
    println!(
        "  {dim}{:<28}{reset} {}",
        "Extensions",
        extensions.join(", "),
        dim = colors::DIM,
        reset = colors::RESET
    );

    context.clear_color(0.5, 0.5, 0.5, 1.0);
    context.clear(gl::COLOR_BUFFER_BIT);
    let mut pixels = PixelBuffer::U8(vec![0; 2 * 2 * 4]);
    context.read_pixels(0, 0, 2, 2, gl::RGBA, gl::UNSIGNED_BYTE, &mut pixels);
    println!(
        "  {dim}{:<28}{reset} {:?}",
        "readPixels(0,0,2,2) of grey",
        pixels,
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!();
}

/// Main application entry point
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let matches = build_cli().get_matches();

    // Get verbosity settings before loading config
    let verbosity = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");

    // Initialize logging
    init_tracing(verbosity, quiet);

    // Convert matches to CliArgs
    let cli_args = parse_cli_args(&matches);

    // Load configuration with full precedence chain
    let config: ShieldConfig = cli_args
        .load_config()
        .context("Failed to load configuration")?;
    debug!("Configuration loaded: {:?}", config);

    if matches.get_flag("preload") {
        println!("{}", preload_script(&config));
        return Ok(());
    }

    let host: Rc<dyn ContextProvider> = Rc::new(SoftwareHost::new());
    let mut builder = Shield::builder(config);
    if let Some(origin) = matches.get_one::<String>("origin") {
        builder = builder.origin(origin.clone());
    }
    let shield = builder.initialize(host).await;
    info!("Session {} ready", shield.session().id());

    if matches.get_flag("script") {
        println!("{}", protection_script(shield.session()));
        return Ok(());
    }

    if matches.get_flag("status") {
        let status = serde_json::to_string_pretty(&shield.status())
            .context("Failed to serialize status")?;
        println!("{}", status);
        return Ok(());
    }

    if !quiet {
        print_banner();
        print_config_summary(&shield);
    }

    if matches.get_flag("probe") {
        probe(&shield);
    }

    Ok(())
}
