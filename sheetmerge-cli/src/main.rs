use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use sheetmerge_core::{merge_workbooks, CompressionLevel, MergeOptions, NameMode};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sheetmerge")]
#[command(about = "Merge the active sheet of every .xlsx file in a directory into one workbook")]
#[command(version)]
struct Cli {
    /// Directory containing the source workbooks
    #[arg(short, long, value_name = "DIR")]
    dir: PathBuf,

    /// Output workbook (".xlsx" is appended when there is no extension)
    #[arg(short, long, value_name = "FILE")]
    target: PathBuf,

    /// How target sheets are named
    #[arg(short, long, value_enum, default_value = "sequential")]
    name_mode: NameModeArg,

    /// Cell holding the sheet name, e.g. B2 (required with --name-mode from_cell)
    #[arg(short = 'c', long, value_name = "CELL")]
    name_cell: Option<String>,

    /// Deflate level of the output file
    #[arg(long, value_enum, default_value = "default")]
    compression: CompressionArg,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum NameModeArg {
    /// "Sheet 1", "Sheet 2", ...
    Sequential,
    /// Name of the source workbook's first sheet
    #[value(name = "from_sheet_name")]
    FromSheetName,
    /// Value of the --name-cell cell
    #[value(name = "from_cell")]
    FromCell,
}

impl From<NameModeArg> for NameMode {
    fn from(arg: NameModeArg) -> Self {
        match arg {
            NameModeArg::Sequential => NameMode::Sequential,
            NameModeArg::FromSheetName => NameMode::FromSheetName,
            NameModeArg::FromCell => NameMode::FromCell,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum CompressionArg {
    /// Store only
    None,
    /// Deflate level 1
    Fast,
    /// Deflate level 6
    Default,
    /// Deflate level 9
    Best,
}

impl From<CompressionArg> for CompressionLevel {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => CompressionLevel::None,
            CompressionArg::Fast => CompressionLevel::Fast,
            CompressionArg::Default => CompressionLevel::Default,
            CompressionArg::Best => CompressionLevel::Best,
        }
    }
}

impl Cli {
    fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }

    fn options(&self) -> MergeOptions {
        let mut options = MergeOptions::new(&self.dir, &self.target)
            .with_name_mode(self.name_mode.into())
            .with_compression(self.compression.into());
        if let Some(cell) = &self.name_cell {
            options = options.with_name_cell(cell.clone());
        }
        options
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    let config = cli.options().resolve().context("Invalid arguments")?;
    let summary = merge_workbooks(&config)
        .with_context(|| format!("Failed to merge workbooks from {}", config.source_dir.display()))?;

    for sheet in &summary.sheets {
        println!("{} -> {}", sheet.source.display(), sheet.sheet_name);
    }
    println!(
        "Merged {} sheet(s) into {}",
        summary.sheets.len(),
        summary.target_path.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["sheetmerge", "-d", "in", "-t", "out"]).unwrap();
        assert_eq!(cli.dir, PathBuf::from("in"));
        assert_eq!(cli.target, PathBuf::from("out"));
        assert_eq!(cli.name_mode, NameModeArg::Sequential);
        assert_eq!(cli.compression, CompressionArg::Default);
        assert_eq!(cli.name_cell, None);
        assert_eq!(cli.log_level(), log::LevelFilter::Warn);
    }

    #[test]
    fn test_name_mode_values() {
        let cli = Cli::try_parse_from([
            "sheetmerge", "--dir", "in", "--target", "out.xlsx", "-n", "from_cell", "-c", "B2", "-vv",
        ])
        .unwrap();
        assert_eq!(NameMode::from(cli.name_mode), NameMode::FromCell);
        assert_eq!(cli.name_cell.as_deref(), Some("B2"));
        assert_eq!(cli.log_level(), log::LevelFilter::Debug);

        let options = cli.options();
        assert_eq!(options.name_mode, NameMode::FromCell);
        assert_eq!(options.name_cell.as_deref(), Some("B2"));

        let cli = Cli::try_parse_from(["sheetmerge", "-d", "in", "-t", "out", "--name-mode", "from_sheet_name"]).unwrap();
        assert_eq!(NameMode::from(cli.name_mode), NameMode::FromSheetName);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Cli::try_parse_from(["sheetmerge", "-t", "out"]).is_err());
        assert!(Cli::try_parse_from(["sheetmerge", "-d", "in"]).is_err());
        assert!(Cli::try_parse_from(["sheetmerge", "-d", "in", "-t", "out", "-n", "by_cell"]).is_err());
        assert!(Cli::try_parse_from(["sheetmerge", "-d", "in", "-t", "out", "--compression", "max"]).is_err());
    }

    #[test]
    fn test_compression_mapping() {
        let cli = Cli::try_parse_from(["sheetmerge", "-d", "in", "-t", "out", "--compression", "none"]).unwrap();
        assert_eq!(cli.options().compression, CompressionLevel::None);
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
