use console::style;
use tailsync::migration::{Migrator, MigratorTrait};

use crate::MigrateAction;

pub(crate) async fn handle_migrate(
    action: MigrateAction,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = tailsync::connect(database_url).await?;

    match action {
        MigrateAction::Up => {
            let pending = Migrator::get_pending_migrations(&db).await?;
            if pending.is_empty() {
                println!("Schema is up to date.");
                return Ok(());
            }
            for migration in &pending {
                println!("  applying {}", style(migration.name()).cyan());
            }
            Migrator::up(&db, None).await?;
            println!(
                "{} Applied {} migration(s).",
                style("✓").green().bold(),
                pending.len()
            );
        }
        MigrateAction::Down => {
            Migrator::down(&db, Some(1)).await?;
            println!("{} Rolled back the last migration.", style("✓").green().bold());
        }
        MigrateAction::Status => {
            for migration in Migrator::get_applied_migrations(&db).await? {
                println!("  {} {}", style("applied").green(), migration.name());
            }
            for migration in Migrator::get_pending_migrations(&db).await? {
                println!("  {} {}", style("pending").yellow(), migration.name());
            }
        }
        MigrateAction::Fresh => {
            println!(
                "{} Dropping all tables, including stored checkpoints...",
                style("⚠").yellow().bold()
            );
            Migrator::fresh(&db).await?;
            println!("{} Schema recreated.", style("✓").green().bold());
        }
    }

    Ok(())
}
