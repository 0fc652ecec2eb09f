use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    #[sea_orm(unique)]
    pub email: String,

    #[sea_orm(unique)]
    pub reg_number: String,

    pub full_name: String,

    /// Argon2id password hash
    pub password_hash: String,

    /// "pending" | "approved" | "rejected"
    pub approval_state: String,

    /// Set exactly once, the first time the account is approved. Never cleared.
    pub approved_at: Option<String>,

    /// Immutable after creation; anchors the onboarding deadline.
    pub registered_at: String,

    pub is_active: bool,

    /// Staff and superusers bypass the onboarding gate.
    pub is_staff: bool,

    pub is_department_leader: bool,

    pub is_secretary: bool,

    pub is_treasurer: bool,

    pub picture_uploaded_at: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
