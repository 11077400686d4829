//! SeaORM entity models used by the database store.
//!
//! These structs map to the SQLite tables bootstrapped by `database_store`:
//! - `accreditations` — one vehicle-access grant per row
//! - `vehicles` — vehicles owned by an accreditation
//! - `zone_movements` — append-only zone entry/exit/transfer log
//! - `vehicle_time_slots` — dated, step-numbered zone occupancy intervals
//! - `accreditation_history` — append-only audit log
//! - `accreditation_history_archive` — compressed summaries of old history
//! - `zone_configs`, `events` — reference data
//! - `users`, `user_permissions` — access-control data
//!
//! Timestamps are stored as RFC3339 strings with fixed millisecond
//! precision so lexicographic order matches temporal order; UUIDs are
//! stored as strings for portability.

/// Accreditations table entity models.
pub mod accreditations {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "accreditations")]
    pub struct Model {
        /// UUID as string primary key
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub created_at: String,
        pub updated_at: String,
        /// Optimistic-lock counter
        pub version: i64,
        pub company: String,
        pub stand: Option<String>,
        pub event_id: Option<String>,
        pub message: Option<String>,
        pub consent: bool,
        /// Lifecycle status as string enum
        pub status: String,
        pub current_zone: Option<String>,
        pub entry_at: Option<String>,
        pub exit_at: Option<String>,
        pub is_archived: bool,
        pub email: Option<String>,
        pub sent_at: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Vehicles table entity models.
pub mod vehicles {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "vehicles")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub accreditation_id: String,
        pub plate: String,
        pub trailer_plate: Option<String>,
        pub size: String,
        pub phone_code: Option<String>,
        pub phone_number: Option<String>,
        /// `YYYY-MM-DD`
        pub arrival_date: Option<String>,
        /// `HH:MM`
        pub arrival_time: Option<String>,
        pub origin_city: Option<String>,
        /// JSON-encoded string array; legacy rows may hold a bare string
        pub unloading: String,
        pub distance_km: Option<f64>,
        pub weight_kg: Option<f64>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Zone movement log entity models. Rows are never updated or deleted.
pub mod zone_movements {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "zone_movements")]
    pub struct Model {
        /// Auto-increment row id
        #[sea_orm(primary_key)]
        pub id: i32,
        pub accreditation_id: String,
        pub from_zone: Option<String>,
        pub to_zone: String,
        /// ENTRY | EXIT | TRANSFER
        pub action: String,
        pub created_at: String,
        pub user_name: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Vehicle time slot entity models.
pub mod vehicle_time_slots {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "vehicle_time_slots")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub accreditation_id: String,
        pub vehicle_id: Option<String>,
        /// Calendar day as `YYYY-MM-DD`
        pub date: String,
        /// 1-based per (accreditation, vehicle, date); never renumbered
        pub step_number: i32,
        pub zone: String,
        pub entry_at: String,
        pub exit_at: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Audit history entity models. Rows are immutable once written.
pub mod accreditation_history {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "accreditation_history")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub accreditation_id: String,
        pub action: String,
        pub field: Option<String>,
        pub old_value: Option<String>,
        pub new_value: Option<String>,
        pub description: String,
        pub user_name: Option<String>,
        pub user_agent: Option<String>,
        pub created_at: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Archived history entity models (compact JSON summaries).
pub mod accreditation_history_archive {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "accreditation_history_archive")]
    pub struct Model {
        /// Original history row id
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub accreditation_id: String,
        /// Compact JSON summary with short key names
        pub summary: String,
        /// Original history row timestamp
        pub created_at: String,
        pub archived_at: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Zone reference data entity models.
pub mod zone_configs {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "zone_configs")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub name: String,
        pub label: String,
        pub position: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Event reference data entity models.
pub mod events {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "events")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub name: String,
        pub starts_on: String,
        pub ends_on: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// User entity models for the access-control gate.
pub mod users {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub name: String,
        /// API token presented in the `X-Api-Token` header
        pub token: String,
        /// `admin` bypasses feature checks
        pub role: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Per-user feature permission entity models.
pub mod user_permissions {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "user_permissions")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub user_id: String,
        /// Feature key, e.g. `accreditations.write`
        pub feature: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
