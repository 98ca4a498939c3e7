use diesel::prelude::*;

use crate::db::schema::users;

/// Account id shared by fans and creators. Postgres `BIGINT`, always positive.
pub type UserId = i64;

/// The slice of an account the payment path needs.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: String,
}

impl User {
    pub const ROLE_FAN: &'static str = "fan";
    pub const ROLE_CREATOR: &'static str = "creator";

    pub fn is_fan(&self) -> bool {
        self.role == Self::ROLE_FAN
    }

    pub fn is_creator(&self) -> bool {
        self.role == Self::ROLE_CREATOR
    }
}
