//! WordPress user storage.
//!
//! Accounts live in `P_users`; roles and profile fields live as key–value
//! rows in `P_usermeta`, pivoted here into one record per user. The role is
//! read from the serialized `P_capabilities` blob.

use super::{SchemaContext, UserChange, UserKey, UserSchema};
use crate::adapters::helpers::{RowExt, expect_rows};
use crate::error::CmsError;
use crate::models::{CmsFamily, UserRecord};
use crate::Result;
use async_trait::async_trait;
use sqlx::AnyConnection;
use std::collections::{BTreeMap, BTreeSet};

/// Built-in roles in derivation order
pub const WORDPRESS_ROLES: [&str; 5] = [
    "Administrator",
    "Editor",
    "Author",
    "Contributor",
    "Subscriber",
];

/// Role reported when the capability blob names none of the built-in roles
pub const UNKNOWN_ROLE: &str = "Unknown";

/// Usermeta keys surfaced as profile fields
pub const PROFILE_KEYS: [&str; 3] = ["first_name", "last_name", "nickname"];

/// Derives the role from a serialized capability blob.
///
/// Matching is a case-insensitive substring test; the first built-in role
/// found wins.
pub fn role_from_capabilities(blob: &str) -> &'static str {
    let blob = blob.to_ascii_lowercase();
    WORDPRESS_ROLES
        .iter()
        .find(|role| blob.contains(&role.to_ascii_lowercase()))
        .copied()
        .unwrap_or(UNKNOWN_ROLE)
}

/// Serializes a single-role capability blob, e.g. `a:1:{s:6:"editor";b:1;}`.
pub fn serialize_capabilities(role: &str) -> String {
    let slug = role.to_ascii_lowercase();
    format!("a:1:{{s:{}:\"{}\";b:1;}}", slug.len(), slug)
}

fn canonical_role(role: &str) -> Option<&'static str> {
    WORDPRESS_ROLES
        .iter()
        .find(|known| known.eq_ignore_ascii_case(role.trim()))
        .copied()
}

fn capabilities_key(prefix: &str) -> String {
    format!("{}_capabilities", prefix)
}

/// WordPress `users` + `usermeta` schema
#[derive(Debug, Clone, Copy, Default)]
pub struct WordPressSchema;

#[async_trait]
impl UserSchema for WordPressSchema {
    fn family(&self) -> CmsFamily {
        CmsFamily::WordPress
    }

    async fn fetch(
        &self,
        conn: &mut AnyConnection,
        ctx: &SchemaContext<'_>,
        key: UserKey<'_>,
    ) -> Result<Vec<UserRecord>> {
        let users_table = ctx.installation.table("users");
        let mut params = ctx.dialect.params();
        let filter = key.filter("u.ID", "u.user_login", &mut params);
        let text = |expr: &str| ctx.dialect.cast_text(expr);
        let sql = format!(
            "SELECT {} AS id, {} AS username, {} AS display_name, {} AS email \
             FROM {} u{} ORDER BY u.ID",
            ctx.dialect.cast_int("u.ID"),
            text("u.user_login"),
            text("u.display_name"),
            text("u.user_email"),
            ctx.table("users"),
            filter
        );

        let rows = key
            .bind(sqlx::query(&sql))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                CmsError::query_failed(format!("Failed to read users from {}", users_table), e)
            })?;

        let mut users = Vec::with_capacity(rows.len());
        let mut positions = BTreeMap::new();
        for row in &rows {
            let id: i64 = row.get_field("id", Some(&users_table))?;
            positions.insert(id, users.len());
            users.push(UserRecord {
                id,
                username: row.get_field("username", Some(&users_table))?,
                display_name: row.get_field("display_name", Some(&users_table))?,
                email: row.get_field("email", Some(&users_table))?,
                roles: BTreeSet::new(),
                profile: BTreeMap::new(),
                prefix: ctx.prefix().to_string(),
                family: CmsFamily::WordPress,
            });
        }

        if users.is_empty() {
            return Ok(users);
        }

        let single_user = match key {
            UserKey::All => None,
            UserKey::Id(_) | UserKey::Username(_) => users.first().map(|u| u.id),
        };
        let meta_rows = fetch_meta(conn, ctx, single_user).await?;

        let meta_table = ctx.installation.table("usermeta");
        let caps_key = capabilities_key(ctx.prefix());
        for row in &meta_rows {
            let user_id: i64 = row.get_field("user_id", Some(&meta_table))?;
            let meta_key: String = row.get_field("meta_key", Some(&meta_table))?;
            let meta_value: Option<String> = row.get_field("meta_value", Some(&meta_table))?;
            let Some(&position) = positions.get(&user_id) else {
                continue;
            };
            let user = &mut users[position];
            if meta_key == caps_key {
                let role = role_from_capabilities(meta_value.as_deref().unwrap_or_default());
                user.roles = BTreeSet::from([role.to_string()]);
            } else {
                user.profile.insert(meta_key, meta_value.unwrap_or_default());
            }
        }

        Ok(users)
    }

    async fn write(
        &self,
        conn: &mut AnyConnection,
        ctx: &SchemaContext<'_>,
        change: &UserChange<'_>,
    ) -> Result<Vec<String>> {
        let baseline = change.baseline;
        let desired = change.desired;
        let mut written = Vec::new();

        let mut params = ctx.dialect.params();
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        if desired.display_name != baseline.display_name {
            assignments.push(format!("display_name = {}", params.next_param()));
            values.push(desired.display_name.as_str());
            written.push("display_name".to_string());
        }
        if desired.email != baseline.email {
            assignments.push(format!("user_email = {}", params.next_param()));
            values.push(desired.email.as_str());
            written.push("email".to_string());
        }
        if let Some(hash) = change.password {
            assignments.push(format!("user_pass = {}", params.next_param()));
            values.push(hash.encoded.as_str());
            written.push("password".to_string());
        }

        if !assignments.is_empty() {
            let sql = format!(
                "UPDATE {} SET {} WHERE ID = {}",
                ctx.table("users"),
                assignments.join(", "),
                params.next_param()
            );
            let mut query = sqlx::query(&sql);
            for value in values {
                query = query.bind(value);
            }
            let result = query
                .bind(baseline.id)
                .execute(&mut *conn)
                .await
                .map_err(|e| CmsError::query_failed("Failed to update WordPress user row", e))?;
            expect_rows(ctx.prefix(), &baseline.username, "users", 1, result.rows_affected())?;
        }

        for (key, value) in &desired.profile {
            if !PROFILE_KEYS.contains(&key.as_str()) {
                return Err(CmsError::configuration(format!(
                    "Unsupported WordPress profile field '{}'",
                    key
                )));
            }
            match baseline.profile.get(key) {
                Some(current) if current == value => continue,
                Some(_) => update_meta(conn, ctx, baseline, key, value).await?,
                None => insert_meta(conn, ctx, baseline, key, value).await?,
            }
            written.push(key.clone());
        }

        if desired.roles != baseline.roles {
            let role = single_role(ctx, &desired.roles)?;
            if !baseline.roles.contains(role) {
                let caps_key = capabilities_key(ctx.prefix());
                let blob = serialize_capabilities(role);
                // Roles are only populated when the capability row exists
                if baseline.roles.is_empty() {
                    insert_meta(conn, ctx, baseline, &caps_key, &blob).await?;
                } else {
                    update_meta(conn, ctx, baseline, &caps_key, &blob).await?;
                }
                written.push("roles".to_string());
            }
        }

        Ok(written)
    }
}

/// WordPress users hold exactly one built-in role.
fn single_role(ctx: &SchemaContext<'_>, roles: &BTreeSet<String>) -> Result<&'static str> {
    let mut iter = roles.iter();
    match (iter.next(), iter.next()) {
        (Some(role), None) => canonical_role(role).ok_or_else(|| CmsError::UnknownRole {
            prefix: ctx.prefix().to_string(),
            role: role.clone(),
        }),
        _ => Err(CmsError::configuration(format!(
            "WordPress users need exactly one role, got {}",
            roles.len()
        ))),
    }
}

async fn fetch_meta(
    conn: &mut AnyConnection,
    ctx: &SchemaContext<'_>,
    user_id: Option<i64>,
) -> Result<Vec<sqlx::any::AnyRow>> {
    let caps_key = capabilities_key(ctx.prefix());
    let mut params = ctx.dialect.params();
    let keys: Vec<String> = (0..=PROFILE_KEYS.len()).map(|_| params.next_param()).collect();
    let mut sql = format!(
        "SELECT {} AS user_id, {} AS meta_key, {} AS meta_value \
         FROM {} m WHERE m.meta_key IN ({})",
        ctx.dialect.cast_int("m.user_id"),
        ctx.dialect.cast_text("m.meta_key"),
        ctx.dialect.cast_text("m.meta_value"),
        ctx.table("usermeta"),
        keys.join(", ")
    );
    if user_id.is_some() {
        sql.push_str(&format!(" AND m.user_id = {}", params.next_param()));
    }
    sql.push_str(" ORDER BY m.umeta_id");

    let mut query = sqlx::query(&sql).bind(caps_key.as_str());
    for key in PROFILE_KEYS {
        query = query.bind(key);
    }
    if let Some(id) = user_id {
        query = query.bind(id);
    }

    query.fetch_all(&mut *conn).await.map_err(|e| {
        CmsError::query_failed(
            format!(
                "Failed to read user meta from {}",
                ctx.installation.table("usermeta")
            ),
            e,
        )
    })
}

async fn update_meta(
    conn: &mut AnyConnection,
    ctx: &SchemaContext<'_>,
    user: &UserRecord,
    key: &str,
    value: &str,
) -> Result<()> {
    let mut params = ctx.dialect.params();
    let sql = format!(
        "UPDATE {} SET meta_value = {} WHERE user_id = {} AND meta_key = {}",
        ctx.table("usermeta"),
        params.next_param(),
        params.next_param(),
        params.next_param()
    );
    let result = sqlx::query(&sql)
        .bind(value)
        .bind(user.id)
        .bind(key)
        .execute(&mut *conn)
        .await
        .map_err(|e| CmsError::query_failed(format!("Failed to update user meta '{}'", key), e))?;
    expect_rows(
        ctx.prefix(),
        &user.username,
        &format!("usermeta {}", key),
        1,
        result.rows_affected(),
    )
}

async fn insert_meta(
    conn: &mut AnyConnection,
    ctx: &SchemaContext<'_>,
    user: &UserRecord,
    key: &str,
    value: &str,
) -> Result<()> {
    let mut params = ctx.dialect.params();
    let sql = format!(
        "INSERT INTO {} (user_id, meta_key, meta_value) VALUES ({}, {}, {})",
        ctx.table("usermeta"),
        params.next_param(),
        params.next_param(),
        params.next_param()
    );
    let result = sqlx::query(&sql)
        .bind(user.id)
        .bind(key)
        .bind(value)
        .execute(&mut *conn)
        .await
        .map_err(|e| CmsError::query_failed(format!("Failed to insert user meta '{}'", key), e))?;
    expect_rows(
        ctx.prefix(),
        &user.username,
        &format!("usermeta {}", key),
        1,
        result.rows_affected(),
    )
}
