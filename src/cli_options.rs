use contrib::OutputSpec;
use octree::OctreeOptions;

use crate::rayloop::InputFormat;

/// One `--modifier` occurrence together with the sticky settings (`--bins`,
/// `--expr`, `--output`) in effect when it appeared.
pub struct ModifierOption {
    pub name: String,
    pub bins: i64,
    pub expr: Option<String>,
    pub output: OutputSpec,
}

pub struct CliOptions {
    pub octree: OctreeOptions,
    pub accumulate: i64,
    pub processes: usize,
    pub imm_irrad: bool,
    pub ray_count: Option<u64>,
    pub input_format: InputFormat,
    pub modifiers: Vec<ModifierOption>,
    pub progress: bool,
    pub quiet: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            octree: OctreeOptions::default(),
            accumulate: 1,
            processes: 1,
            imm_irrad: false,
            ray_count: None,
            input_format: InputFormat::Ascii,
            modifiers: Vec::new(),
            progress: false,
            quiet: false,
        }
    }
}

impl CliOptions {
    pub fn message() -> &'static str {
        r#"
        --modifier <name>          track contributions to <name> (repeatable)
        --bins <n>                 bin count for following modifiers
        --expr <expression>        bin index expression for following modifiers
        --output <fmt:dest>        output for following modifiers
                                   (fmt one of a f d c; dest '-', file, or '!cmd')
        --accumulate <n>           rays per record (1 = each ray, 0 = all at end)
        --processes <n>            worker threads per batch
        --ray-count <n>            expected ray count (short input is an error)
        --input-format <a|f|d>     ray input encoding
        --irradiance               treat rays as immediate irradiance probes
        --split-threshold <n>      octree leaf size before subdivision
        --resolution <n>           octree resolution limit
        --leaf-capacity <n>        octree hard leaf bound
        --progress                 show a progress bar (needs --ray-count)
        --quiet                    suppress warnings
        "#
    }
}

/// Parses in argument order: `--bins`, `--expr` and `--output` are sticky and
/// apply to every later `--modifier` until overridden.
pub fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut args = args.into_iter().rev().collect::<Vec<_>>();
    args.pop(); // Removes args[0]

    let mut options = CliOptions::default();
    let mut bins: i64 = 1;
    let mut expr: Option<String> = None;
    let mut output = OutputSpec::parse("a:-").map_err(|e| e.to_string())?;

    while let Some(key) = args.pop() {
        if !key.starts_with('-') {
            return Err(format!("Unrecognized key {}", key));
        }
        let mut value = || {
            args.pop()
                .ok_or_else(|| format!("Missing value for {}", key))
        };
        match key.as_str() {
            "--modifier" => {
                options.modifiers.push(ModifierOption {
                    name: value()?,
                    bins,
                    expr: expr.clone(),
                    output: output.clone(),
                });
            }
            "--bins" => bins = parse_num(&key, &value()?)?,
            "--expr" => expr = Some(value()?),
            "--output" => output = OutputSpec::parse(&value()?).map_err(|e| e.to_string())?,
            "--accumulate" => options.accumulate = parse_num(&key, &value()?)?,
            "--processes" => options.processes = parse_num(&key, &value()?)?,
            "--ray-count" => options.ray_count = Some(parse_num(&key, &value()?)?),
            "--input-format" => {
                options.input_format = match value()?.as_str() {
                    "a" => InputFormat::Ascii,
                    "f" => InputFormat::Float,
                    "d" => InputFormat::Double,
                    other => return Err(format!("Unrecognized input format {}", other)),
                }
            }
            "--irradiance" => options.imm_irrad = true,
            "--split-threshold" => options.octree.split_threshold = parse_num(&key, &value()?)?,
            "--resolution" => options.octree.resolution_limit = parse_num(&key, &value()?)?,
            "--leaf-capacity" => options.octree.leaf_capacity = parse_num(&key, &value()?)?,
            "--progress" => options.progress = true,
            "--quiet" => options.quiet = true,
            "--help" => {
                println!("usage: {}", CliOptions::message());
            }
            _ => return Err(format!("Unrecognized key {}", key)),
        }
    }
    Ok(options)
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Bad value '{}' for {}", value, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("octray")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn sticky_modifier_settings() {
        let options = parse_args(args(&[
            "--bins", "4", "--expr", "floor(px)", "--modifier", "red", "--bins", "2",
            "--modifier", "green",
        ]))
        .unwrap();
        assert_eq!(options.modifiers.len(), 2);
        assert_eq!(options.modifiers[0].name, "red");
        assert_eq!(options.modifiers[0].bins, 4);
        assert_eq!(options.modifiers[1].bins, 2);
        assert_eq!(options.modifiers[1].expr.as_deref(), Some("floor(px)"));
    }

    #[test]
    fn loop_and_octree_knobs() {
        let options = parse_args(args(&[
            "--accumulate", "16", "--processes", "8", "--ray-count", "640",
            "--input-format", "d", "--resolution", "512", "--irradiance",
        ]))
        .unwrap();
        assert_eq!(options.accumulate, 16);
        assert_eq!(options.processes, 8);
        assert_eq!(options.ray_count, Some(640));
        assert_eq!(options.input_format, InputFormat::Double);
        assert_eq!(options.octree.resolution_limit, 512);
        assert!(options.imm_irrad);
    }

    #[test]
    fn bad_keys_and_values_are_rejected() {
        assert!(parse_args(args(&["--no-such-flag"])).is_err());
        assert!(parse_args(args(&["--bins", "many"])).is_err());
        assert!(parse_args(args(&["--modifier"])).is_err());
    }
}
