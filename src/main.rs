use itertools::Itertools;
use radiometry::Color;
use shape::FlatShader;

use octray::cli_options::{self, CliOptions};
use octray::rayloop::{self, LoopOptions, RayReader};

fn main() {
    let options = match cli_options::parse_args(std::env::args().collect()) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("usage: {}", CliOptions::message());
            std::process::exit(1);
        }
    };
    let mut logger = env_logger::Builder::from_default_env();
    if options.quiet {
        logger.filter_level(log::LevelFilter::Error);
    }
    logger.init();

    std::process::exit(match run(options) {
        Ok(()) => 0,
        Err(message) => {
            eprintln!("octray: {}", message);
            2
        }
    });
}

fn run(options: CliOptions) -> Result<(), String> {
    let scene = scene::preset::demo(options.octree).map_err(|e| e.to_string())?;

    let mut registry = contrib::ContribRegistry::new();
    if options.modifiers.is_empty() {
        // No explicit selection: track every modifier the demo scene emits,
        // one single-bin record each on stdout.
        let spec = contrib::OutputSpec::stdout(contrib::OutputFormat::Ascii);
        for name in &scene::preset::demo_modifiers() {
            registry
                .register(name, spec.clone(), None, 1)
                .map_err(|e| e.to_string())?;
        }
    } else {
        for m in &options.modifiers {
            registry
                .register(&m.name, m.output.clone(), m.expr.as_deref(), m.bins)
                .map_err(|e| e.to_string())?;
        }
    }
    log::info!(
        "tracking modifiers: {}",
        registry.mods().iter().map(|m| m.name()).join(", ")
    );

    let mut sinks = contrib::SinkTable::new();
    registry.connect_sinks(&mut sinks).map_err(|e| e.to_string())?;

    let shader = FlatShader {
        albedo: Color::gray(0.8),
    };
    let loop_options = LoopOptions {
        accumulate: options.accumulate,
        ray_count: options.ray_count,
        processes: options.processes,
        imm_irrad: options.imm_irrad,
        progress: options.progress,
    };
    let stdin = std::io::stdin();
    let mut reader = RayReader::new(stdin.lock(), options.input_format);
    let stats = rayloop::run(
        &scene,
        &shader,
        &mut registry,
        &mut sinks,
        &mut reader,
        &loop_options,
    )
    .map_err(|e| e.to_string())?;
    sinks.close_all().map_err(|e| e.to_string())?;

    log::info!(
        "{} rays, {} contributions, {} records, {} dropped, {} warnings",
        stats.rays,
        stats.contributions,
        stats.flushes,
        stats.dropped,
        stats.warnings
    );
    Ok(())
}
