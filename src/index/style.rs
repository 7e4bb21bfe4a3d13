// Style definitions keyed by normalized classification name

use rusqlite::{params, Connection};

use super::Style;
use crate::error::StoreError;

/// Insert or overwrite a style's display attributes.
pub fn upsert_style(conn: &Connection, style: &Style) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO styles (name, color, background_color, font_weight)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(name) DO UPDATE SET
            color = excluded.color,
            background_color = excluded.background_color,
            font_weight = excluded.font_weight",
        params![style.name, style.color, style.background_color, style.font_weight],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::schema::init_schema;

    #[test]
    fn test_upsert_overwrites_attributes() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let mut style = Style {
            name: "csharp-kw".to_string(),
            color: Some("blue".to_string()),
            ..Default::default()
        };
        upsert_style(&conn, &style).unwrap();

        style.color = None;
        style.font_weight = Some("bold".to_string());
        upsert_style(&conn, &style).unwrap();

        let (count, color, weight): (i64, Option<String>, Option<String>) = conn
            .query_row(
                "SELECT COUNT(*), MAX(color), MAX(font_weight) FROM styles",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(color, None);
        assert_eq!(weight.as_deref(), Some("bold"));
    }
}
