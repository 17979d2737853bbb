use super::CrmStore;
use crate::{
    entity::{NewProduct, Product, ProductPatch},
    error::CrmResult,
    types::EntityId,
};
use rusqlite::{params, OptionalExtension, Row};

const PRODUCT_COLUMNS: &str = "id, name, description, category, price, currency, status, icon,
     trend, stock_available, stock_threshold, sales_count, profit_margin, vendor,
     launch_date, specifications";

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id:              row.get(0)?,
        name:            row.get(1)?,
        description:     row.get(2)?,
        category:        row.get(3)?,
        price:           row.get(4)?,
        currency:        row.get(5)?,
        status:          row.get(6)?,
        icon:            row.get(7)?,
        trend:           row.get(8)?,
        stock_available: row.get(9)?,
        stock_threshold: row.get(10)?,
        sales_count:     row.get(11)?,
        profit_margin:   row.get(12)?,
        vendor:          row.get(13)?,
        launch_date:     row.get(14)?,
        specifications:  row.get(15)?,
    })
}

impl CrmStore {
    // ── Product ───────────────────────────────────────────────────

    pub fn insert_product(&self, p: &NewProduct) -> CrmResult<Product> {
        p.validate()?;
        self.conn.execute(
            "INSERT INTO product (
                name, description, category, price, currency, status, icon, trend,
                stock_available, stock_threshold, sales_count, profit_margin, vendor,
                launch_date, specifications
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                &p.name,
                &p.description,
                &p.category,
                p.price,
                &p.currency,
                &p.status,
                &p.icon,
                p.trend,
                p.stock_available,
                p.stock_threshold,
                p.sales_count,
                p.profit_margin,
                &p.vendor,
                p.launch_date,
                &p.specifications,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        log::debug!("store: inserted product {id} '{}'", p.name);
        Ok(p.clone().into_product(id))
    }

    pub fn get_product(&self, id: EntityId) -> CrmResult<Option<Product>> {
        let product = self
            .conn
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE id = ?1"),
                params![id],
                product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    pub fn list_products(&self) -> CrmResult<Vec<Product>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PRODUCT_COLUMNS} FROM product ORDER BY id ASC"))?;
        let rows = stmt
            .query_map([], product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Highest-priced products first; equal prices by id.
    pub fn top_products(&self, limit: usize) -> CrmResult<Vec<Product>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product ORDER BY price DESC, id ASC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Merge `patch` into the stored product. None when the id does not exist.
    pub fn update_product(&self, id: EntityId, patch: ProductPatch) -> CrmResult<Option<Product>> {
        let Some(existing) = self.get_product(id)? else {
            return Ok(None);
        };
        let p = patch.apply(&existing);
        p.validate()?;
        self.conn.execute(
            "UPDATE product SET
                name = ?2, description = ?3, category = ?4, price = ?5, currency = ?6,
                status = ?7, icon = ?8, trend = ?9, stock_available = ?10,
                stock_threshold = ?11, sales_count = ?12, profit_margin = ?13,
                vendor = ?14, launch_date = ?15, specifications = ?16
             WHERE id = ?1",
            params![
                id,
                &p.name,
                &p.description,
                &p.category,
                p.price,
                &p.currency,
                &p.status,
                &p.icon,
                p.trend,
                p.stock_available,
                p.stock_threshold,
                p.sales_count,
                p.profit_margin,
                &p.vendor,
                p.launch_date,
                &p.specifications,
            ],
        )?;
        Ok(Some(p.into_product(id)))
    }

    pub fn delete_product(&self, id: EntityId) -> CrmResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM product WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
