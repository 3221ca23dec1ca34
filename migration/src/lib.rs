pub use sea_orm_migration::prelude::*;

mod m20250801_000001_create_donations_table;
mod m20250801_000002_create_users_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250801_000001_create_donations_table::Migration),
            Box::new(m20250801_000002_create_users_table::Migration),
        ]
    }
}
