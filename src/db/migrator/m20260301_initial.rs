use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Hash the default admin password using Argon2id
fn hash_default_password() -> String {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let password = b"password";
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password, &salt)
        .expect("Failed to hash default password")
        .to_string()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Accounts)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(AuditLog)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Seed a staff account so a fresh install can reach the admin surface.
        let now = chrono::Utc::now().to_rfc3339();
        let password_hash = hash_default_password();

        let insert = sea_orm_migration::sea_query::Query::insert()
            .into_table(Accounts)
            .columns([
                crate::entities::accounts::Column::Username,
                crate::entities::accounts::Column::Email,
                crate::entities::accounts::Column::RegNumber,
                crate::entities::accounts::Column::FullName,
                crate::entities::accounts::Column::PasswordHash,
                crate::entities::accounts::Column::ApprovalState,
                crate::entities::accounts::Column::ApprovedAt,
                crate::entities::accounts::Column::RegisteredAt,
                crate::entities::accounts::Column::IsActive,
                crate::entities::accounts::Column::IsStaff,
                crate::entities::accounts::Column::IsDepartmentLeader,
                crate::entities::accounts::Column::IsSecretary,
                crate::entities::accounts::Column::IsTreasurer,
                crate::entities::accounts::Column::CreatedAt,
                crate::entities::accounts::Column::UpdatedAt,
            ])
            .values_panic([
                "admin".into(),
                "admin@localhost".into(),
                "ADMIN-0000".into(),
                "Administrator".into(),
                password_hash.into(),
                "approved".into(),
                now.clone().into(),
                now.clone().into(),
                true.into(),
                true.into(),
                false.into(),
                false.into(),
                false.into(),
                now.clone().into(),
                now.into(),
            ])
            .to_owned();

        manager.exec_stmt(insert).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuditLog).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts).to_owned())
            .await?;

        Ok(())
    }
}
