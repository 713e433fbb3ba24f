use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use tracing::info;

use crate::db::models::{LeagueMemberRow, MemberRow, RaidStatisticRow, WarResultRow};
use crate::error::Result;
use crate::types::{ClanTag, LeagueMember, Member, RaidStatistic, WarObservation};

/// Handle to the one long-lived SQLite pool. Opened in `main`, cloned into
/// every worker, closed at shutdown. Every statement autocommits on its own
/// and every value is bound, never interpolated.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database ready at {db_path}");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // -----------------------------------------------------------------------
    // Roster
    // -----------------------------------------------------------------------

    pub async fn members(&self, clan_tag: &ClanTag) -> Result<Vec<MemberRow>> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT member_name, member_tag, member_role
            FROM members
            WHERE clan_tag = ?
            ORDER BY rowid
            "#,
        )
        .bind(clan_tag.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Insert or refresh name/role/clan of one member.
    pub async fn upsert_member(&self, member: &Member, clan_tag: &ClanTag) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO members (member_tag, member_name, member_role, clan_tag)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(member_tag) DO UPDATE SET
                member_name = excluded.member_name,
                member_role = excluded.member_role,
                clan_tag = excluded.clan_tag
            "#,
        )
        .bind(member.tag.as_str())
        .bind(&member.name)
        .bind(member.role.as_str())
        .bind(clan_tag.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete stored members of `clan_tag` whose tag is not in `keep`.
    /// Returns the number of rows removed.
    pub async fn delete_members_not_in(&self, clan_tag: &ClanTag, keep: &[&str]) -> Result<u64> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM members WHERE clan_tag = ");
        qb.push_bind(clan_tag.as_str());
        if !keep.is_empty() {
            qb.push(" AND member_tag NOT IN (");
            let mut separated = qb.separated(", ");
            for tag in keep {
                separated.push_bind(*tag);
            }
            separated.push_unseparated(")");
        }
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // War-league results (accumulator)
    // -----------------------------------------------------------------------

    /// Add one observation. The first insert seeds the row; on collision the
    /// totals grow and `avg_score` is recomputed from the post-update totals
    /// inside the same statement.
    pub async fn add_war_result(
        &self,
        obs: &WarObservation,
        clan_tag: &ClanTag,
        season: &str,
    ) -> Result<()> {
        let stars = i64::from(obs.stars);
        sqlx::query(
            r#"
            INSERT INTO war_results (member_tag, clan_tag, member_name, stars, attacks, avg_score, season)
            VALUES (?, ?, ?, ?, 1, CAST(? AS REAL), ?)
            ON CONFLICT(member_tag, clan_tag) DO UPDATE SET
                member_name = excluded.member_name,
                stars = war_results.stars + excluded.stars,
                attacks = war_results.attacks + 1,
                avg_score = CAST(war_results.stars + excluded.stars AS REAL) / (war_results.attacks + 1),
                season = excluded.season
            "#,
        )
        .bind(obs.member_tag.as_str())
        .bind(clan_tag.as_str())
        .bind(&obs.member_name)
        .bind(stars)
        .bind(stars)
        .bind(season)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn war_results(&self, clan_tag: &ClanTag) -> Result<Vec<WarResultRow>> {
        let rows = sqlx::query_as::<_, WarResultRow>(
            r#"
            SELECT member_name, member_tag, stars, attacks, avg_score, season
            FROM war_results
            WHERE clan_tag = ?
            ORDER BY avg_score DESC, stars DESC, member_name
            "#,
        )
        .bind(clan_tag.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Presence check gating aggregation of one tournament instance.
    pub async fn has_war_results(&self, clan_tag: &ClanTag, season: &str) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM war_results WHERE clan_tag = ? AND season = ?)",
        )
        .bind(clan_tag.as_str())
        .bind(season)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    /// Drop accumulators left over from an older tournament of this clan.
    pub async fn delete_war_results_except(&self, clan_tag: &ClanTag, season: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM war_results WHERE clan_tag = ? AND season <> ?")
            .bind(clan_tag.as_str())
            .bind(season)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Raid statistics (snapshot)
    // -----------------------------------------------------------------------

    /// Replace the stored snapshot of one member unconditionally.
    pub async fn upsert_raid_statistic(&self, stat: &RaidStatistic, clan_tag: &ClanTag) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO raid_statistics (member_tag, clan_tag, member_name, collected_coins, donated_coins, saved_coins)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(member_tag, clan_tag) DO UPDATE SET
                member_name = excluded.member_name,
                collected_coins = excluded.collected_coins,
                donated_coins = excluded.donated_coins,
                saved_coins = excluded.saved_coins
            "#,
        )
        .bind(stat.member_tag.as_str())
        .bind(clan_tag.as_str())
        .bind(&stat.member_name)
        .bind(stat.collected)
        .bind(stat.donated)
        .bind(stat.saved)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn raid_statistics(&self, clan_tag: &ClanTag) -> Result<Vec<RaidStatisticRow>> {
        let rows = sqlx::query_as::<_, RaidStatisticRow>(
            r#"
            SELECT member_name, member_tag, collected_coins, donated_coins, saved_coins
            FROM raid_statistics
            WHERE clan_tag = ?
            ORDER BY collected_coins DESC, member_name
            "#,
        )
        .bind(clan_tag.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // War-league roster
    // -----------------------------------------------------------------------

    pub async fn insert_league_member(&self, member: &LeagueMember, clan_tag: &ClanTag) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO league_members (member_tag, clan_tag, member_name, town_hall_level)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(member.tag.as_str())
        .bind(clan_tag.as_str())
        .bind(&member.name)
        .bind(i64::from(member.town_hall_level))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn league_members(&self, clan_tag: &ClanTag) -> Result<Vec<LeagueMemberRow>> {
        let rows = sqlx::query_as::<_, LeagueMemberRow>(
            r#"
            SELECT member_name, member_tag, town_hall_level
            FROM league_members
            WHERE clan_tag = ?
            ORDER BY town_hall_level DESC, member_name
            "#,
        )
        .bind(clan_tag.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_league_members(&self, clan_tag: &ClanTag) -> Result<u64> {
        let result = sqlx::query("DELETE FROM league_members WHERE clan_tag = ?")
            .bind(clan_tag.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Registered clans
    // -----------------------------------------------------------------------

    pub async fn register_clan(&self, chat_id: i64, clan_tag: &ClanTag) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO registered_clans (chat_id, clan_tag) VALUES (?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET clan_tag = excluded.clan_tag
            "#,
        )
        .bind(chat_id)
        .bind(clan_tag.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clan_for_chat(&self, chat_id: i64) -> Result<Option<ClanTag>> {
        let tag: Option<String> =
            sqlx::query_scalar("SELECT clan_tag FROM registered_clans WHERE chat_id = ?")
                .bind(chat_id)
                .fetch_optional(&self.pool)
                .await?;
        tag.map(|t| ClanTag::parse(&t)).transpose()
    }

    /// Distinct clan tags across all chats.
    pub async fn registered_clans(&self) -> Result<Vec<ClanTag>> {
        let tags: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT clan_tag FROM registered_clans ORDER BY clan_tag")
                .fetch_all(&self.pool)
                .await?;
        tags.iter().map(|t| ClanTag::parse(t)).collect()
    }
}

#[cfg(test)]
impl Store {
    /// Single-connection in-memory database with the schema applied.
    pub(crate) async fn in_memory() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        Self { pool }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, Tag};

    fn clan() -> ClanTag {
        Tag::parse("#CLAN").unwrap()
    }

    fn obs(tag: &str, stars: u32) -> WarObservation {
        WarObservation {
            member_name: format!("name-{tag}"),
            member_tag: Tag::parse(tag).unwrap(),
            stars,
        }
    }

    #[tokio::test]
    async fn war_result_average_uses_post_update_totals() {
        let store = Store::in_memory().await;
        let clan = clan();

        for stars in [3, 1, 2, 0] {
            store.add_war_result(&obs("#P1", stars), &clan, "2024-01").await.unwrap();
        }

        let rows = store.war_results(&clan).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stars, 6);
        assert_eq!(rows[0].attacks, 4);
        assert!((rows[0].avg_score - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn war_result_average_independent_of_interleaving() {
        let store = Store::in_memory().await;
        let clan = clan();

        store.add_war_result(&obs("#P1", 3), &clan, "s").await.unwrap();
        store.add_war_result(&obs("#P2", 0), &clan, "s").await.unwrap();
        store.add_war_result(&obs("#P1", 2), &clan, "s").await.unwrap();
        store.add_war_result(&obs("#P2", 1), &clan, "s").await.unwrap();
        store.add_war_result(&obs("#P1", 2), &clan, "s").await.unwrap();

        let rows = store.war_results(&clan).await.unwrap();
        let p1 = rows.iter().find(|r| r.member_tag == "#P1").unwrap();
        let p2 = rows.iter().find(|r| r.member_tag == "#P2").unwrap();
        assert!((p1.avg_score - 7.0 / 3.0).abs() < 1e-9);
        assert!((p2.avg_score - 0.5).abs() < 1e-9);
        // Ordered by average descending.
        assert_eq!(rows[0].member_tag, "#P1");
    }

    #[tokio::test]
    async fn presence_check_is_per_season() {
        let store = Store::in_memory().await;
        let clan = clan();
        assert!(!store.has_war_results(&clan, "2024-01").await.unwrap());

        store.add_war_result(&obs("#P1", 3), &clan, "2024-01").await.unwrap();
        assert!(store.has_war_results(&clan, "2024-01").await.unwrap());
        assert!(!store.has_war_results(&clan, "2024-02").await.unwrap());

        assert_eq!(store.delete_war_results_except(&clan, "2024-02").await.unwrap(), 1);
        assert!(store.war_results(&clan).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn raid_statistic_is_overwritten_not_added() {
        let store = Store::in_memory().await;
        let clan = clan();
        let tag = Tag::parse("#P1").unwrap();

        store
            .upsert_raid_statistic(&RaidStatistic::new("a".into(), tag.clone(), 100, 20), &clan)
            .await
            .unwrap();
        store
            .upsert_raid_statistic(&RaidStatistic::new("a".into(), tag, 150, 20), &clan)
            .await
            .unwrap();

        let rows = store.raid_statistics(&clan).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].collected_coins, 150);
        assert_eq!(rows[0].donated_coins, 20);
        assert_eq!(rows[0].saved_coins, 130);
    }

    #[tokio::test]
    async fn delete_members_not_in_keeps_listed() {
        let store = Store::in_memory().await;
        let clan = clan();
        for tag in ["#A", "#B", "#C"] {
            let m = Member { name: tag.into(), tag: Tag::parse(tag).unwrap(), role: Role::Member };
            store.upsert_member(&m, &clan).await.unwrap();
        }

        let removed = store.delete_members_not_in(&clan, &["#A", "#C"]).await.unwrap();
        assert_eq!(removed, 1);
        let tags: Vec<_> = store
            .members(&clan)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.member_tag)
            .collect();
        assert_eq!(tags, vec!["#A".to_string(), "#C".to_string()]);
    }

    #[tokio::test]
    async fn league_member_insert_is_ignore_on_conflict() {
        let store = Store::in_memory().await;
        let clan = clan();
        let m = LeagueMember { name: "a".into(), tag: Tag::parse("#P1").unwrap(), town_hall_level: 14 };
        store.insert_league_member(&m, &clan).await.unwrap();
        let bumped = LeagueMember { town_hall_level: 15, ..m };
        store.insert_league_member(&bumped, &clan).await.unwrap();

        let rows = store.league_members(&clan).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].town_hall_level, 14);

        assert_eq!(store.delete_league_members(&clan).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn chat_registration_round_trip() {
        let store = Store::in_memory().await;
        store.register_clan(1, &Tag::parse("#AAA").unwrap()).await.unwrap();
        store.register_clan(2, &Tag::parse("#AAA").unwrap()).await.unwrap();
        store.register_clan(3, &Tag::parse("#BBB").unwrap()).await.unwrap();
        store.register_clan(3, &Tag::parse("#CCC").unwrap()).await.unwrap();

        assert_eq!(store.clan_for_chat(3).await.unwrap().unwrap().as_str(), "#CCC");
        assert!(store.clan_for_chat(99).await.unwrap().is_none());

        let clans: Vec<String> = store
            .registered_clans()
            .await
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(clans, vec!["#AAA".to_string(), "#CCC".to_string()]);
    }
}
