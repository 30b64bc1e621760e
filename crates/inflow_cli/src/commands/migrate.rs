//! The `migrate` command: apply or roll back schema migrations.

use sea_orm::DatabaseConnection;

use inflow::migration::{Migrator, MigratorTrait};

pub(crate) async fn handle_up(db: &DatabaseConnection) -> Result<(), Box<dyn std::error::Error>> {
    Migrator::up(db, None).await?;
    println!("migrations applied");
    Ok(())
}

pub(crate) async fn handle_down(db: &DatabaseConnection) -> Result<(), Box<dyn std::error::Error>> {
    Migrator::down(db, Some(1)).await?;
    println!("rolled back one migration");
    Ok(())
}

pub(crate) async fn handle_status(
    db: &DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let applied = Migrator::get_applied_migrations(db).await?;
    let pending = Migrator::get_pending_migrations(db).await?;
    for migration in &applied {
        println!("applied  {}", migration.name());
    }
    for migration in &pending {
        println!("pending  {}", migration.name());
    }
    if applied.is_empty() && pending.is_empty() {
        println!("no migrations found");
    }
    Ok(())
}
