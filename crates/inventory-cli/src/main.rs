use clap::Parser;

fn main() -> anyhow::Result<()> {
    let args = inventory_cli::Args::parse();
    inventory_cli::init_logging(args.verbose);
    inventory_cli::run_with_args(args)
}
