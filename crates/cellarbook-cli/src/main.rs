//! cellarbook CLI - catalog a pipe tobacco cellar from the terminal
//!
//! Items, tins, CSV interchange, statistics and device sync over the shared
//! cellarbook-core services.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, NamesCommands, PrefsCommands, SyncCommands, TinCommands};
use crate::commands::add::run_add;
use crate::commands::common::{load_config, open_app};
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit, ItemEdit};
use crate::commands::export::run_export;
use crate::commands::import::run_import;
use crate::commands::list::run_list;
use crate::commands::names::{run_names_list, run_names_prune};
use crate::commands::prefs::{
    run_prefs_item_sync, run_prefs_show, run_prefs_sort, run_prefs_sync, run_prefs_unmetered_only,
};
use crate::commands::show::run_show;
use crate::commands::stats::run_stats;
use crate::commands::sync::{
    run_sync_download, run_sync_run, run_sync_status, run_sync_upload, run_sync_watch,
};
use crate::commands::tin::{run_tin_add, run_tin_delete, run_tin_edit, run_tin_finish, run_tin_list};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "cellarbook=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    // Completions need neither config nor database
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let config = load_config(cli.config.as_deref(), cli.db_path)?;
    let app = open_app(config).await?;

    match cli.command {
        Commands::Add {
            brand,
            blend,
            fields,
        } => run_add(&app, &brand, &blend, &fields).await?,
        Commands::List { filter, json } => run_list(&app, &filter, json).await?,
        Commands::Show { item, json } => run_show(&app, &item, json).await?,
        Commands::Edit {
            item,
            brand,
            blend,
            fields,
            clear_rating,
        } => {
            let edit = ItemEdit {
                brand: brand.as_deref(),
                blend: blend.as_deref(),
                fields: &fields,
                clear_rating,
            };
            run_edit(&app, &item, &edit).await?;
        }
        Commands::Delete { item } => run_delete(&app, &item).await?,
        Commands::Tin { command } => match command {
            TinCommands::Add {
                item,
                label,
                fields,
            } => run_tin_add(&app, &item, &label, &fields).await?,
            TinCommands::List { item, json } => run_tin_list(&app, &item, json).await?,
            TinCommands::Edit { id, label, fields } => {
                run_tin_edit(&app, id, label.as_deref(), &fields).await?;
            }
            TinCommands::Finish { id } => run_tin_finish(&app, id).await?,
            TinCommands::Delete { id } => run_tin_delete(&app, id).await?,
        },
        Commands::Names { command, json } => match command {
            None => run_names_list(&app, json).await?,
            Some(NamesCommands::List { json: list_json }) => {
                run_names_list(&app, json || list_json).await?;
            }
            Some(NamesCommands::Prune) => run_names_prune(&app).await?,
        },
        Commands::Import { path, merge } => run_import(&app, &path, merge).await?,
        Commands::Export {
            tins,
            format,
            output,
            filter,
        } => run_export(&app, format, tins, &filter, output.as_deref()).await?,
        Commands::Stats { filter, json } => run_stats(&app, &filter, json).await?,
        Commands::Sync { command } => match command {
            SyncCommands::Upload => run_sync_upload(&app).await?,
            SyncCommands::Download => run_sync_download(&app).await?,
            SyncCommands::Run => run_sync_run(&app).await?,
            SyncCommands::Watch => run_sync_watch(&app).await?,
            SyncCommands::Status { json } => run_sync_status(&app, json).await?,
        },
        Commands::Prefs { command } => match command {
            PrefsCommands::Show { json } => run_prefs_show(&app, json)?,
            PrefsCommands::Sync { state } => run_prefs_sync(&app, state)?,
            PrefsCommands::UnmeteredOnly { state } => run_prefs_unmetered_only(&app, state)?,
            PrefsCommands::ItemSync { item, state } => {
                run_prefs_item_sync(&app, &item, state).await?;
            }
            PrefsCommands::Sort { field, desc } => run_prefs_sort(&app, field, desc)?,
        },
        Commands::Completions { .. } => {}
    }

    Ok(())
}
