use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::cascade::rules::{reevaluate_parent, Firing, ParentAction};
use crate::db::table::{quoted, table, TableDef, ID, IS_ACTIVE, UPDATED_AT};
use crate::error::{AppError, Result};
use crate::types::EntityKind;

/// What one propagation run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    /// Firings evaluated, the originating one included.
    pub firings: usize,
    /// Rows the protocol switched off, in the order it did so.
    pub deactivated: Vec<(EntityKind, Uuid)>,
}

enum Step {
    Upward(Firing),
    Downward(Firing),
}

/// Run the cascade protocol for `root` on the caller's transaction.
///
/// Each firing first re-evaluates its parent, then (for deactivating updates)
/// switches its children off. Every row the protocol itself changes fires in
/// turn, nested the way row triggers nest: a parent's firing completes before
/// the child that caused it continues downward. Rows whose value doesn't
/// change fire nothing, which bounds the walk to the four levels.
///
/// Any error leaves the transaction to be rolled back by the caller.
pub async fn propagate(conn: &mut SqliteConnection, root: Firing, now: &str) -> Result<CascadeReport> {
    let mut report = CascadeReport::default();
    let mut stack = vec![Step::Upward(root)];

    while let Some(step) = stack.pop() {
        match step {
            Step::Upward(firing) => {
                report.firings += 1;
                if firing.cascades_down() {
                    stack.push(Step::Downward(firing));
                }
                if let Some(parent) = reevaluate_upward(conn, &firing, now).await? {
                    report.deactivated.push((parent.kind(), parent.id()));
                    stack.push(Step::Upward(parent));
                }
            }
            Step::Downward(firing) => {
                let children = deactivate_children(conn, &firing, now).await?;
                // Reversed so the stack replays them in statement order.
                for child in children.into_iter().rev() {
                    report.deactivated.push((child.kind(), child.id()));
                    stack.push(Step::Upward(child));
                }
            }
        }
    }

    Ok(report)
}

async fn reevaluate_upward(conn: &mut SqliteConnection, firing: &Firing, now: &str) -> Result<Option<Firing>> {
    let child = table(firing.kind());
    let (Some(parent), Some(fk)) = (child.parent(), child.parent_column) else {
        return Ok(None);
    };
    let fk = quoted(fk);
    let (id_col, active_col) = (quoted(ID), quoted(IS_ACTIVE));

    let row: Option<(String, bool)> = sqlx::query_as(&format!(
        "SELECT p.{id_col}, p.{active_col} FROM {} c JOIN {} p ON p.{id_col} = c.{fk} WHERE c.{id_col} = ?",
        child.name, parent.name,
    ))
    .bind(firing.id().to_string())
    .fetch_optional(&mut *conn)
    .await?;
    let Some((parent_id, parent_active)) = row else {
        return Ok(None);
    };

    let active_children: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE {fk} = ? AND {active_col} = 1",
        child.name,
    ))
    .bind(parent_id.as_str())
    .fetch_one(&mut *conn)
    .await?;

    let action = reevaluate_parent(active_children, parent_active, firing.became_active());
    debug!(
        child = %firing.kind(),
        child_id = %firing.id(),
        parent = parent.name,
        parent_id = %parent_id,
        active_children,
        parent_active,
        ?action,
        "parent re-evaluated",
    );
    if action == ParentAction::Leave {
        return Ok(None);
    }

    let changed = sqlx::query(&format!(
        "UPDATE {} SET {active_col} = 0, {ua} = max({ua}, ?) WHERE {id_col} = ? AND {active_col} = 1",
        parent.name,
        ua = quoted(UPDATED_AT),
    ))
    .bind(now)
    .bind(parent_id.as_str())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if changed == 0 {
        return Ok(None);
    }
    Ok(Some(Firing::Updated {
        kind: parent.kind,
        id: parse_id(&parent_id)?,
        was: true,
        now: false,
    }))
}

async fn deactivate_children(conn: &mut SqliteConnection, firing: &Firing, now: &str) -> Result<Vec<Firing>> {
    let parent = table(firing.kind());
    let Some(child) = parent.child() else {
        return Ok(Vec::new());
    };
    let fk = child_fk(child)?;
    let (id_col, active_col) = (quoted(ID), quoted(IS_ACTIVE));

    let ids: Vec<String> = sqlx::query_scalar(&format!(
        "UPDATE {} SET {active_col} = 0, {ua} = max({ua}, ?) WHERE {fk} = ? AND {active_col} = 1 RETURNING {id_col}",
        child.name,
        ua = quoted(UPDATED_AT),
    ))
    .bind(now)
    .bind(firing.id().to_string())
    .fetch_all(&mut *conn)
    .await?;

    debug!(
        parent = %firing.kind(),
        parent_id = %firing.id(),
        child = child.name,
        count = ids.len(),
        "children deactivated",
    );

    ids.iter()
        .map(|id| {
            Ok(Firing::Updated {
                kind: child.kind,
                id: parse_id(id)?,
                was: true,
                now: false,
            })
        })
        .collect()
}

fn child_fk(child: &TableDef) -> Result<String> {
    child
        .parent_column
        .map(quoted)
        .ok_or_else(|| AppError::Corrupt(format!("{} has no parent column", child.name)))
}

fn parse_id(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| AppError::Corrupt(format!("id '{text}': {e}")))
}
