//! Unit tests for CLI argument parsing

use clap::Parser;
use comic_downloader::cli::{Cli, Commands, OutputFormat};
use comic_downloader::DownloadMode;
use std::time::Duration;

#[test]
fn test_cli_defaults() {
    let cli = Cli::parse_from(["comic-downloader", "download", "https://example.com/series/x"]);

    assert_eq!(cli.concurrency, 3);
    assert_eq!(cli.max_retries, 3);
    assert_eq!(cli.delay_ms, 1000);
    assert_eq!(cli.output_format, OutputFormat::Human);
    assert!(!cli.overwrite);

    let Commands::Download(args) = &cli.command else {
        panic!("expected download command");
    };
    assert_eq!(args.mode, DownloadMode::WholeSeries);

    let config = cli.download_config();
    assert!(config.headless);
    assert_eq!(config.time_budget, None);
    assert_eq!(config.request_timeout, Duration::from_secs(60));
}

#[test]
fn test_cli_single_chapter_mode() {
    let cli = Cli::parse_from([
        "comic-downloader",
        "--output-format",
        "json",
        "download",
        "https://example.com/series/x/chapter-3",
        "--mode",
        "single-chapter",
        "--overwrite",
    ]);

    assert_eq!(cli.output_format, OutputFormat::Json);
    assert!(cli.overwrite);
    let Commands::Download(args) = &cli.command else {
        panic!("expected download command");
    };
    assert_eq!(args.mode, DownloadMode::SingleChapter);
}

#[test]
fn test_cli_rejects_out_of_range_values() {
    assert!(Cli::try_parse_from(["comic-downloader", "--concurrency", "0", "sources"]).is_err());
    assert!(Cli::try_parse_from(["comic-downloader", "--max-retries", "50", "sources"]).is_err());
    assert!(Cli::try_parse_from(["comic-downloader", "download", "x", "--mode", "volume"]).is_err());
}

#[test]
fn test_cli_verify_command() {
    let cli = Cli::parse_from(["comic-downloader", "verify", "downloads/Demo Series"]);
    let Commands::Verify(cmd) = &cli.command else {
        panic!("expected verify command");
    };
    assert_eq!(cmd.series_dir, std::path::PathBuf::from("downloads/Demo Series"));
}
