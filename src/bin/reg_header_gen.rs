use clap::{App, Arg};
use reg_model::driver::{RegDriver, SimDriver};
use reg_model::factory::RegFactory;
use reg_model::logger::{logger_dis, logger_en, LogContext};
use reg_model::manager::RegManager;
use reg_model::*;
use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAX_BARS: usize = 8;

fn main() {
    let matches = App::new("reg_header_gen")
        .about("Generates register headers from a register definition file")
        .arg(
            Arg::with_name("defs")
                .index(1)
                .required(true)
                .value_name("DEF_FILE")
                .validator(|path| {
                    if Path::new(path.as_str()).is_file() {
                        Ok(())
                    } else {
                        Err(format!("{} is not file!", path))
                    }
                })
                .help("register definition file"),
        )
        .arg(
            Arg::with_name("path")
                .index(2)
                .required(true)
                .value_name("OUT_PATH")
                .validator(|path| {
                    if Path::new(path.as_str()).is_dir() {
                        Ok(())
                    } else {
                        Err(format!("{} is not dir!", path))
                    }
                })
                .help("header files output path"),
        )
        .arg(
            Arg::with_name("define")
                .short("D")
                .value_name("KEY=VALUE")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .validator(|kv| {
                    if kv.contains('=') {
                        Ok(())
                    } else {
                        Err(format!("{} is not KEY=VALUE!", kv))
                    }
                })
                .help("setting used by definition conditions"),
        )
        .arg(
            Arg::with_name("language")
                .short("l")
                .long("lang")
                .value_name("LANG")
                .require_delimiter(true)
                .takes_value(true)
                .validator(
                    |raw| match raw.split_whitespace().collect::<String>().as_str() {
                        "c" => Ok(()),
                        _ => return Err(String::from("only support 'c'")),
                    },
                )
                .default_value("c")
                .help("header files language"),
        )
        .arg(
            Arg::with_name("statics")
                .long("statics")
                .help("trace register operations to reg_model.trace.json"),
        )
        .get_matches();
    logger_en(matches.is_present("statics"));
    let defs = PathBuf::from(matches.value_of("defs").unwrap());
    let path = PathBuf::from(matches.value_of("path").unwrap());
    let settings = matches
        .values_of("define")
        .unwrap_or_default()
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect::<HashMap<_, _>>();
    let manager = load(&defs, &settings).unwrap_or_else(|e| {
        eprintln!("Load {} failed: {}", defs.display(), e);
        std::process::exit(1)
    });
    let languages = matches.values_of("language").unwrap_or_default();
    for l in languages {
        gen_regs(&manager, &defs, &path, l).expect(&format!(
            "Gen regs for '{}' to {} failed!",
            l,
            path.display()
        ));
    }
    logger_dis();
}

fn load(defs: &Path, settings: &HashMap<String, String>) -> error::Result<RegManager> {
    let drivers = (0..MAX_BARS)
        .map(|_| Arc::new(SimDriver::new()) as Arc<dyn RegDriver>)
        .collect();
    let factory = RegFactory::new(drivers, Arc::new(LogContext::default()));
    let mut manager = RegManager::new();
    let file = fs::File::open(defs)?;
    factory.parse_stream(BufReader::new(file), &mut manager, settings)?;
    Ok(manager)
}

fn gen_regs(manager: &RegManager, defs: &Path, path: &PathBuf, lang: &str) -> std::io::Result<()> {
    let header_ty = HeaderType::from_lang(lang).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("unsupported language {}", lang),
        )
    })?;
    let out_path = path.join(lang);
    if !out_path.is_dir() {
        fs::create_dir_all(&out_path)?;
    }
    let stem = defs
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("regs")
        .to_case(Case::Snake);
    let guard = format!("__{}_H__", stem.to_case(Case::UpperSnake));
    let out_file_path = out_path.join(format!("{}.h", stem));
    let mut out_file = fs::File::create(&out_file_path)?;
    writeln!(out_file, "// This file is auto generated!")?;
    writeln!(out_file, "#ifndef {}", guard)?;
    writeln!(out_file, "#define {}", guard)?;
    manager.gen_header(&header_ty, &mut out_file)?;
    writeln!(out_file, "#endif")?;
    println!("Gen {} successfully!", out_file_path.display());
    Ok(())
}
