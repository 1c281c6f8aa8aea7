use clap::Parser;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::sync::Arc;

use roster::capability::BulkTagEditor;
use roster::config::{self, CliArgs};
use roster::error::StoreError;
use roster::model::EntityWithTags;
use roster::parser::{self, Command};
use roster::reconciler::{RoleReconciler, TagChange};
use roster::remote::RestStore;
use roster::storage::{FileKv, KeyValueStore, MemoryKv};
use roster::table::{Column, SelectableTable, SortValue, TableOptions};

type Entities = SelectableTable<EntityWithTags, String>;

fn main() {
    let args = CliArgs::parse();
    config::init_tracing();
    print_banner();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("could not start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let mut store = RestStore::new(&args.url);
    if let Some(key) = &args.api_key {
        store = store.with_api_key(key.as_str());
    }
    let reconciler = RoleReconciler::new(store);

    let prefs: Arc<dyn KeyValueStore> = match FileKv::open(&args.prefs) {
        Ok(kv) => Arc::new(kv),
        Err(e) => {
            tracing::warn!(path = %args.prefs.display(), error = %e, "column preferences will not be kept");
            Arc::new(MemoryKv::new())
        }
    };

    let options = TableOptions {
        default_page_size: args.page_size,
        empty_message: "No entities found.".to_string(),
        ..TableOptions::default()
    }
    .scoped("entities", "main");
    let mut table: Entities = SelectableTable::new(entity_columns(), |e: &EntityWithTags| e.id.clone(), prefs, options);

    match runtime.block_on(reload(&reconciler, &mut table)) {
        Ok(()) => println!("[\u{2713}] Connected to {}", args.url),
        Err(e) => {
            println!("[\u{2717}] Could not load entities from {}: {}", args.url, e);
            println!("    Make sure the backend is running ('roster --addr ...').");
        }
    }
    println!("Type 'HELP' for supported commands or 'EXIT' to quit.\n");

    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        print!("roster> ");
        let _ = io::stdout().flush();
        buffer.clear();

        match stdin.read_line(&mut buffer) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("could not read input: {}", e);
                break;
            }
        }
        if buffer.trim().is_empty() { continue; }

        match parser::parse_command(&buffer) {
            Ok(Command::Exit) => break,
            Ok(cmd) => {
                if let Err(e) = runtime.block_on(execute_command(cmd, &reconciler, &mut table)) {
                    println!("[\u{26a0}\u{fe0f} Error] {}", e);
                }
            }
            Err(e) => {
                println!("[\u{2717} Syntax Error] {}", e);
                if buffer.to_uppercase().starts_with("ADD") {
                    println!("    \u{2139}\u{fe0f}  Hint: tag names are quoted: ADD \"cliente\" TO <id>");
                }
            }
        }
    }

    table.unmount();
}

fn print_banner() {
    println!("\n==================================================");
    println!("   Roster CLI - entities and their tags");
    println!("==================================================\n");
}

fn print_help() {
    println!("\n--- Available Commands ---");
    println!("1. LIST                       reload entities");
    println!("2. TAGS                       list active tags");
    println!("3. PAGE n | NEXT | PREV       move between pages");
    println!("4. SIZE n | SIZE ALL          rows per page");
    println!("5. SORT col                   sort (again to flip direction)");
    println!("6. PICK n [SHIFT] | PICK ALL  select row #n, a range, or this page");
    println!("7. CLEAR                      clear the selection");
    println!("8. SHOW col | HIDE col        column visibility");
    println!("9. ADD \"tag\" TO id | REMOVE \"tag\" FROM id");
    println!("10. SYNC id [\"a\", \"b\"]        make id's tags exactly this set");
    println!("11. ASSIGN \"tag\" | UNASSIGN \"tag\"   bulk edit over the selection");
    println!("12. EXIT\n");
}

fn entity_columns() -> Vec<Column<EntityWithTags>> {
    vec![
        Column::new("name", "Name", |e: &EntityWithTags| SortValue::from(e.name.as_str())).sortable(),
        Column::new("email", "Email", |e: &EntityWithTags| SortValue::from(e.email.clone())).sortable(),
        Column::new("phone", "Phone", |e: &EntityWithTags| SortValue::from(e.phone.clone())),
        Column::new("document", "Document", |e: &EntityWithTags| SortValue::from(e.document.clone())).sortable(),
        Column::new("tags", "Tags", |e: &EntityWithTags| SortValue::from(e.tags.join(", "))).sortable(),
        Column::new("id", "ID", |e: &EntityWithTags| SortValue::from(e.id.as_str())),
    ]
}

async fn reload(reconciler: &RoleReconciler<RestStore>, table: &mut Entities) -> Result<(), StoreError> {
    let token = table.lifecycle();
    let records = reconciler.entities_with_tags().await?;
    table.replace_records_if_live(&token, records);
    Ok(())
}

fn describe(change: TagChange) -> &'static str {
    match change {
        TagChange::ViaProcedure => "done",
        TagChange::AlreadyActive => "already assigned",
        TagChange::Reactivated | TagChange::ReactivatedAfterConflict => "reactivated",
        TagChange::Inserted => "assigned",
        TagChange::Deactivated => "removed",
        TagChange::NotAssigned => "was not assigned",
    }
}

async fn execute_command(
    cmd: Command,
    reconciler: &RoleReconciler<RestStore>,
    table: &mut Entities,
) -> Result<(), StoreError> {
    match cmd {
        Command::Help => { print_help(); return Ok(()) },
        Command::Exit => return Ok(()),

        Command::List => reload(reconciler, table).await?,
        Command::Tags => {
            let tags = reconciler.available_tags().await?;
            if tags.is_empty() {
                println!("No tags yet.");
            }
            for t in tags {
                println!("  \u{2022} {}", t.name);
            }
            return Ok(());
        }

        // --- TABLE ---
        Command::Page(n) => table.set_page(n),
        Command::Next => table.next_page(),
        Command::Prev => table.prev_page(),
        Command::Size(size) => table.set_page_size(size),
        Command::Sort(col) => {
            table.click_header(&col);
            if !table.columns().iter().any(|c| c.key == col && c.sortable) {
                println!("Column '{}' cannot be sorted.", col);
            }
        }
        Command::Pick { index, shift } => {
            if index == 0 || !table.toggle_index(index - 1, shift) {
                println!("No row #{}.", index);
            }
        }
        Command::PickAll => table.toggle_select_all(),
        Command::Clear => table.clear_selection(),
        Command::Show(col) | Command::Hide(col) if !table.columns().iter().any(|c| c.key == col) => {
            println!("Unknown column '{}'.", col);
        }
        Command::Show(col) => { table.set_column_visible(&col, true); },
        Command::Hide(col) => { table.set_column_visible(&col, false); },

        // --- TAGS ---
        Command::Add { tag, entity } => {
            let change = reconciler.add_tag(&entity, &tag).await?;
            println!("[\u{2713} OK] '{}' on {}: {}", tag, entity, describe(change));
            reload(reconciler, table).await?;
        }
        Command::Remove { tag, entity } => {
            let change = reconciler.remove_tag(&entity, &tag).await?;
            println!("[\u{2713} OK] '{}' on {}: {}", tag, entity, describe(change));
            reload(reconciler, table).await?;
        }
        Command::Sync { entity, tags } => {
            let desired: BTreeSet<String> = tags.into_iter().collect();
            let report = reconciler.sync_tags(&entity, &desired).await?;
            println!("{}", report.summary());
            for f in report.failures() {
                if let Err(e) = &f.result {
                    println!("  [\u{2717}] {} '{}': {}", f.op, f.tag, e);
                }
            }
            reload(reconciler, table).await?;
        }
        Command::Assign(tag) | Command::Unassign(tag) if table.selected().is_empty() => {
            println!("Select rows first (PICK n) to change '{}' in bulk.", tag);
            return Ok(());
        }
        Command::Assign(tag) => bulk(reconciler, table, |e| e.stage_add(&tag)).await?,
        Command::Unassign(tag) => bulk(reconciler, table, |e| e.stage_remove(&tag)).await?,
    }

    print!("{}", table.render());
    Ok(())
}

async fn bulk(
    reconciler: &RoleReconciler<RestStore>,
    table: &mut Entities,
    stage: impl FnOnce(&mut BulkTagEditor<'_, RoleReconciler<RestStore>>),
) -> Result<(), StoreError> {
    let mut editor = BulkTagEditor::new(reconciler);
    stage(&mut editor);

    let report = editor.apply_to_selection(table).await;
    println!("{}", report.summary());
    for f in report.outcomes.iter().filter(|o| !o.is_ok()) {
        if let Err(e) = &f.result {
            println!("  [\u{2717}] {} '{}' on {}: {}", f.op, f.tag, f.entity_id, e);
        }
    }
    reload(reconciler, table).await
}
