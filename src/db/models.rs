/// Row types matching the schema in migrations/0001_init.sql.
/// Used by sqlx for typed queries.
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct MemberRow {
    pub member_name: String,
    pub member_tag: String,
    pub member_role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct WarResultRow {
    pub member_name: String,
    pub member_tag: String,
    pub stars: i64,
    pub attacks: i64,
    pub avg_score: f64,
    pub season: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RaidStatisticRow {
    pub member_name: String,
    pub member_tag: String,
    pub collected_coins: i64,
    pub donated_coins: i64,
    pub saved_coins: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LeagueMemberRow {
    pub member_name: String,
    pub member_tag: String,
    pub town_hall_level: i64,
}
