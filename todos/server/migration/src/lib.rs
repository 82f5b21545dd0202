pub use sea_orm_migration::prelude::*;

mod m20250801_090000_create_accounts_table;
mod m20250801_090500_create_todos_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250801_090000_create_accounts_table::Migration),
            Box::new(m20250801_090500_create_todos_table::Migration),
        ]
    }
}
