use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};
use diesel_async::RunQueryDsl;
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use valuable::Valuable;

use crate::{
    db::{
        model::{self, AsDieselQueryBase, FetchById, Pagination, non_blank},
        util::{AsIlike, BoxedDieselExpression, DieselExpressionBuilder},
    },
    fetch_by_query,
    schema::{
        self,
        phenotyper::{self, created_at as created_at_col, id as id_col, name as name_col},
    },
};

#[derive(Deserialize, Serialize, Clone, Valuable, Validate)]
#[garde(allow_unvalidated)]
pub struct NewPhenotyper {
    #[garde(custom(non_blank))]
    pub name: String,
    #[garde(email)]
    pub email: String,
}

impl model::Write for NewPhenotyper {
    type Returns = Phenotyper;

    async fn write(
        self,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Self::Returns> {
        let Self { name, email } = self;

        let inserted = diesel::insert_into(phenotyper::table)
            .values((
                id_col.eq(Uuid::now_v7()),
                name_col.eq(name.trim()),
                phenotyper::email.eq(email.trim()),
            ))
            .returning(Phenotyper::as_returning())
            .get_result(db_conn)
            .await?;

        Ok(inserted)
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = schema::phenotyper, check_for_backend(Pg))]
pub struct Phenotyper {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Identifiable, AsChangeset, Deserialize, Serialize, Valuable, Validate)]
#[diesel(table_name = schema::phenotyper, check_for_backend(Pg))]
#[garde(allow_unvalidated)]
pub struct PhenotyperUpdate {
    #[valuable(skip)]
    pub id: Uuid,
    #[garde(inner(custom(non_blank)))]
    pub name: Option<String>,
    #[garde(inner(email))]
    pub email: Option<String>,
}

impl model::Write for PhenotyperUpdate {
    type Returns = Phenotyper;

    async fn write(
        self,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Self::Returns> {
        if let Self {
            name: None,
            email: None,
            ..
        } = &self
        {
            return Phenotyper::fetch_by_id(&self.id, db_conn).await;
        }

        Ok(diesel::update(&self)
            .set(&self)
            .returning(Phenotyper::as_returning())
            .get_result(db_conn)
            .await?)
    }
}

impl AsDieselQueryBase for Phenotyper {
    type QueryBase = phenotyper::table;

    fn as_diesel_query_base() -> Self::QueryBase {
        phenotyper::table
    }
}

impl model::FetchById for Phenotyper {
    type Id = Uuid;

    async fn fetch_by_id(
        id: &Self::Id,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Self> {
        Ok(Self::as_diesel_query_base()
            .find(id)
            .select(Self::as_select())
            .first(db_conn)
            .await?)
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Default, Valuable, Debug)]
#[serde(rename_all = "snake_case")]
pub enum PhenotyperOrdinalColumn {
    #[default]
    Name,
    CreatedAt,
}

#[derive(Deserialize, Serialize, Clone, Copy, Valuable, Debug)]
pub struct PhenotyperOrdering {
    #[serde(default)]
    pub column: PhenotyperOrdinalColumn,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Deserialize, Serialize, Default, Valuable, Validate, Debug)]
#[garde(allow_unvalidated)]
pub struct PhenotyperQuery {
    #[serde(default)]
    #[valuable(skip)]
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order_by: Vec<PhenotyperOrdering>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl<QuerySource> model::AsDieselFilter<QuerySource> for PhenotyperQuery
where
    id_col: SelectableExpression<QuerySource>,
    name_col: SelectableExpression<QuerySource>,
{
    fn as_diesel_filter<'a>(&'a self) -> Option<BoxedDieselExpression<'a, QuerySource>>
    where
        QuerySource: 'a,
    {
        let Self { ids, name, .. } = self;

        let mut query = DieselExpressionBuilder::default();

        if !ids.is_empty() {
            query = query.and(id_col.eq_any(ids));
        }

        if let Some(name) = name {
            query = query.and(name_col.ilike(name.as_ilike()));
        }

        query.build()
    }
}

impl model::FetchByQuery for Phenotyper {
    type QueryParams = PhenotyperQuery;

    async fn fetch_by_query(
        query: &Self::QueryParams,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Vec<Self>> {
        use PhenotyperOrdinalColumn::{CreatedAt, Name};

        fetch_by_query!(query, [(Name, name_col), (CreatedAt, created_at_col)], db_conn)
    }
}
