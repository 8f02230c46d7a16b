//! Customer repository over `PostgreSQL`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use customer_manager_core::{
    Customer, CustomerId, Email, IdNumber, PersonName, Phone, StreetAddress, UserId,
};

use super::{CustomerStore, RepositoryError};

const CUSTOMER_COLUMNS: &str = "id, id_number, first_name, last_name, email, phone, address, \
     formatted_address, latitude, longitude, created_by, created_at, updated_at";

/// A `customers` row as stored.
#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    id_number: String,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    address: String,
    formatted_address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = RepositoryError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = move |field: &str, e: &dyn std::fmt::Display| {
            RepositoryError::DataCorruption(format!("invalid {field} in customer {id}: {e}"))
        };

        Ok(Self {
            id: CustomerId::new(row.id),
            id_number: IdNumber::parse(&row.id_number).map_err(|e| corrupt("id_number", &e))?,
            first_name: PersonName::parse(&row.first_name)
                .map_err(|e| corrupt("first_name", &e))?,
            last_name: PersonName::parse(&row.last_name).map_err(|e| corrupt("last_name", &e))?,
            email: Email::parse_as_entered(&row.email).map_err(|e| corrupt("email", &e))?,
            phone: Phone::parse_optional(row.phone.as_deref())
                .map_err(|e| corrupt("phone", &e))?,
            address: StreetAddress::parse(&row.address).map_err(|e| corrupt("address", &e))?,
            formatted_address: row.formatted_address,
            latitude: row.latitude,
            longitude: row.longitude,
            created_by: UserId::new(row.created_by),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for customer database operations.
#[derive(Clone)]
pub struct PgCustomerRepository {
    pool: PgPool,
}

impl PgCustomerRepository {
    /// Create a new customer repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerStore for PgCustomerRepository {
    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Customer>, RepositoryError> {
        let rows: Vec<CustomerRow> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers \
             WHERE created_by = $1 ORDER BY created_at DESC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Customer::try_from).collect()
    }

    async fn get(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Customer::try_from).transpose()
    }

    async fn insert(&self, customer: &Customer) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO customers ({CUSTOMER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(customer.id)
        .bind(customer.id_number.as_str())
        .bind(customer.first_name.as_str())
        .bind(customer.last_name.as_str())
        .bind(customer.email.as_str())
        .bind(customer.phone.as_ref().map(Phone::as_str))
        .bind(customer.address.as_str())
        .bind(customer.formatted_address.as_deref())
        .bind(customer.latitude)
        .bind(customer.longitude)
        .bind(customer.created_by)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| super::conflict_on_unique(e, "customer"))?;

        Ok(())
    }

    async fn update(&self, customer: &Customer) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE customers
            SET id_number = $2, first_name = $3, last_name = $4, email = $5, phone = $6,
                address = $7, formatted_address = $8, latitude = $9, longitude = $10,
                updated_at = $11
            WHERE id = $1
            ",
        )
        .bind(customer.id)
        .bind(customer.id_number.as_str())
        .bind(customer.first_name.as_str())
        .bind(customer.last_name.as_str())
        .bind(customer.email.as_str())
        .bind(customer.phone.as_ref().map(Phone::as_str))
        .bind(customer.address.as_str())
        .bind(customer.formatted_address.as_deref())
        .bind(customer.latitude)
        .bind(customer.longitude)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: CustomerId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
