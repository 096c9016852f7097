use clap::Parser;
use redis_export::{cli::Cli, ConnectionPool, Exporter, Result};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // Best-effort tool: failures are reported, the exit status stays 0
    if let Err(e) = run(Cli::parse()) {
        println!("{}", e);
    }
}

fn run(cli: Cli) -> Result<()> {
    if !cli.selector_given() {
        println!("Need key.");
        return Ok(());
    }

    let mut pool = ConnectionPool::open(&cli.connection_config())?;
    let mut exporter = Exporter::new(&mut pool, &cli.output_dir);

    if !cli.key.is_empty() {
        match exporter.export_key(cli.key.as_bytes()) {
            Ok(cmd) => println!("{}", cmd),
            Err(e) => println!("{}", e),
        }
    }

    if !cli.scan.is_empty() {
        match exporter.export_pattern(&cli.scan) {
            Ok(Some(summary)) => println!(
                "exported {} of {} key(s) to {}",
                summary.written,
                summary.matched,
                summary.path.display()
            ),
            Ok(None) => println!("do not match any keys"),
            Err(e @ redis_export::ExportError::Io(_)) => println!("output file error: {}", e),
            Err(e) => println!("Scan error: {}: {}", cli.scan, e),
        }
    }

    pool.close_all();
    Ok(())
}
