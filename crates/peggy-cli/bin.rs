use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{arg, value_parser, ArgMatches, Command};
use peggy::{GenerateOptions, GenerateOutput, GrammarSourceText, ModuleFormat, OutputKind};

fn command() -> ArgMatches {
  Command::new("peggy")
    .version("0.1.0")
    .about("Builds PEG parsers from grammar files.")
    .subcommand(
      Command::new("build")
        .about("Compile one or more grammar files into a Rust source file.")
        .arg(arg!(-o --out <OUTPUT_PATH> "Directory the generated file is written to.\n  Defaults to the CWD").required(false).value_parser(value_parser!(PathBuf)))
        .arg(arg!(-n --name <NAME> "Base name of the generated file (without extension).\n  Defaults to the first input's file stem.").required(false))
        .arg(arg!(-f --format <FORMAT> "Module wrapping: bare, commonjs, amd, umd, es, globals.").required(false).default_value("bare"))
        .arg(arg!(--start <RULE> "Allowed start rule. Repeatable; pass '*' to allow every rule.").required(false).num_args(1..))
        .arg(arg!(--cache "Enable memoization in the generated parser.").required(false))
        .arg(arg!(--"export-var" <NAME> "Identifier the 'globals' format attaches the dispatch table to.").required(false).default_value("PARSER"))
        .arg(arg!(--map "Also emit a '<name>.map.json' source map.").required(false))
        .arg(arg!(<INPUTS>).help("Path(s) to source grammar files").required(true).value_parser(value_parser!(PathBuf))),
    )
    .subcommand(
      Command::new("ast")
        .about("Dump the analyzed grammar AST as JSON.")
        .arg(arg!(<INPUTS>).help("Path(s) to source grammar files").required(true).value_parser(value_parser!(PathBuf))),
    )
    .subcommand(
      Command::new("check")
        .about("Run analysis only and print diagnostics.")
        .arg(arg!(<INPUTS>).help("Path(s) to source grammar files").required(true).value_parser(value_parser!(PathBuf))),
    )
    .get_matches()
}

fn read_sources(matches: &ArgMatches) -> Vec<GrammarSourceText> {
  matches
    .get_many::<PathBuf>("INPUTS")
    .unwrap_or_default()
    .map(|path| {
      let text = fs::read_to_string(path).unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()));
      let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.to_string_lossy().into_owned());
      GrammarSourceText::new(name, text)
    })
    .collect()
}

fn parse_format(value: &str) -> ModuleFormat {
  match value {
    "commonjs" => ModuleFormat::CommonJs,
    "amd" => ModuleFormat::Amd,
    "umd" => ModuleFormat::Umd,
    "es" => ModuleFormat::Es,
    "globals" => ModuleFormat::Globals,
    _ => ModuleFormat::Bare,
  }
}

fn run_build(matches: &ArgMatches) -> ExitCode {
  let pwd = std::env::current_dir().unwrap();
  let sources = read_sources(matches);
  let inputs = matches.get_many::<PathBuf>("INPUTS").unwrap_or_default().cloned().collect::<Vec<_>>();

  let out_dir = matches.get_one::<PathBuf>("out").cloned().unwrap_or_else(|| pwd.clone());
  let name = matches
    .get_one::<String>("name")
    .cloned()
    .or_else(|| inputs.first().and_then(|p| p.file_stem()).map(|s| s.to_string_lossy().into_owned()))
    .unwrap_or_else(|| "grammar".to_string());
  let format = parse_format(matches.get_one::<String>("format").map(String::as_str).unwrap_or("bare"));
  let start_rules = matches.get_many::<String>("start").map(|v| v.cloned().collect()).unwrap_or_default();
  let cache = matches.get_flag("cache");
  let export_var = matches.get_one::<String>("export-var").cloned().unwrap_or_else(|| "PARSER".to_string());
  let want_map = matches.get_flag("map");

  let options = GenerateOptions::default()
    .output(if want_map { OutputKind::SourceAndMap } else { OutputKind::Source })
    .format(format)
    .allowed_start_rules(start_rules)
    .cache(cache)
    .export_var(export_var)
    .grammar_source(name.clone())
    .warning(std::sync::Arc::new(|problem| eprintln!("warning: {problem}")));

  match peggy::generate(sources, options) {
    Ok(GenerateOutput::Source(text)) => {
      let path = out_dir.join(format!("{name}.rs"));
      fs::write(&path, text).unwrap_or_else(|err| panic!("failed to write {}: {err}", path.display()));
      println!("wrote {}", path.display());
      ExitCode::SUCCESS
    }
    Ok(GenerateOutput::SourceAndMap(text, map)) => {
      let path = out_dir.join(format!("{name}.rs"));
      fs::write(&path, text).unwrap_or_else(|err| panic!("failed to write {}: {err}", path.display()));
      let map_path = out_dir.join(format!("{name}.map.json"));
      let json = serde_json::to_string_pretty(&map.entries.iter().map(|(line, span)| serde_json::json!({"line": line, "span": format!("{span:?}")})).collect::<Vec<_>>())
        .expect("source map entries always serialize");
      fs::write(&map_path, json).unwrap_or_else(|err| panic!("failed to write {}: {err}", map_path.display()));
      println!("wrote {} and {}", path.display(), map_path.display());
      ExitCode::SUCCESS
    }
    Ok(_) => unreachable!("build only requests Source/SourceAndMap output"),
    Err(err) => {
      eprintln!("{err}");
      ExitCode::FAILURE
    }
  }
}

fn run_ast(matches: &ArgMatches) -> ExitCode {
  let sources = read_sources(matches);
  let options = GenerateOptions::default().output(OutputKind::Ast);
  match peggy::generate(sources, options) {
    Ok(GenerateOutput::Ast(grammar)) => {
      match serde_json::to_string_pretty(&grammar) {
        Ok(json) => {
          println!("{json}");
          ExitCode::SUCCESS
        }
        Err(err) => {
          eprintln!("failed to serialize grammar: {err}");
          ExitCode::FAILURE
        }
      }
    }
    Ok(_) => unreachable!("ast only requests Ast output"),
    Err(err) => {
      eprintln!("{err}");
      ExitCode::FAILURE
    }
  }
}

fn run_check(matches: &ArgMatches) -> ExitCode {
  let sources = read_sources(matches);
  let mut ok = true;
  let options = GenerateOptions::default()
    .output(OutputKind::Ast)
    .warning(std::sync::Arc::new(|problem| {
      eprintln!("warning: {problem}");
    }));
  match peggy::generate(sources, options) {
    Ok(_) => println!("ok"),
    Err(err) => {
      eprintln!("{err}");
      ok = false;
    }
  }
  if ok {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  }
}

fn main() -> ExitCode {
  let matches = command();
  match matches.subcommand() {
    Some(("build", sub)) => run_build(sub),
    Some(("ast", sub)) => run_ast(sub),
    Some(("check", sub)) => run_check(sub),
    _ => {
      eprintln!("no subcommand given; run with --help");
      ExitCode::FAILURE
    }
  }
}
