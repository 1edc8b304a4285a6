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
        scientist::{self, created_at as created_at_col, id as id_col, name as name_col},
    },
};

#[derive(Deserialize, Serialize, Clone, Valuable, Validate)]
#[garde(allow_unvalidated)]
pub struct NewScientist {
    #[garde(custom(non_blank))]
    pub name: String,
    #[garde(email)]
    pub email: String,
}

impl model::Write for NewScientist {
    type Returns = Scientist;

    async fn write(
        self,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Self::Returns> {
        let Self { name, email } = self;

        let inserted = diesel::insert_into(scientist::table)
            .values((
                id_col.eq(Uuid::now_v7()),
                name_col.eq(name.trim()),
                scientist::email.eq(email.trim()),
            ))
            .returning(Scientist::as_returning())
            .get_result(db_conn)
            .await?;

        Ok(inserted)
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = schema::scientist, check_for_backend(Pg))]
pub struct Scientist {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Identifiable, AsChangeset, Deserialize, Serialize, Valuable, Validate)]
#[diesel(table_name = schema::scientist, check_for_backend(Pg))]
#[garde(allow_unvalidated)]
pub struct ScientistUpdate {
    #[valuable(skip)]
    pub id: Uuid,
    #[garde(inner(custom(non_blank)))]
    pub name: Option<String>,
    #[garde(inner(email))]
    pub email: Option<String>,
}

impl model::Write for ScientistUpdate {
    type Returns = Scientist;

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
            return Scientist::fetch_by_id(&self.id, db_conn).await;
        }

        Ok(diesel::update(&self)
            .set(&self)
            .returning(Scientist::as_returning())
            .get_result(db_conn)
            .await?)
    }
}

impl AsDieselQueryBase for Scientist {
    type QueryBase = scientist::table;

    fn as_diesel_query_base() -> Self::QueryBase {
        scientist::table
    }
}

impl model::FetchById for Scientist {
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
pub enum ScientistOrdinalColumn {
    #[default]
    Name,
    CreatedAt,
}

#[derive(Deserialize, Serialize, Clone, Copy, Valuable, Debug)]
pub struct ScientistOrdering {
    #[serde(default)]
    pub column: ScientistOrdinalColumn,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Deserialize, Serialize, Default, Valuable, Validate, Debug)]
#[garde(allow_unvalidated)]
pub struct ScientistQuery {
    #[serde(default)]
    #[valuable(skip)]
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order_by: Vec<ScientistOrdering>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl<QuerySource> model::AsDieselFilter<QuerySource> for ScientistQuery
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

impl model::FetchByQuery for Scientist {
    type QueryParams = ScientistQuery;

    async fn fetch_by_query(
        query: &Self::QueryParams,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Vec<Self>> {
        use ScientistOrdinalColumn::{CreatedAt, Name};

        fetch_by_query!(query, [(Name, name_col), (CreatedAt, created_at_col)], db_conn)
    }
}

#[cfg(test)]
mod tests {
    use diesel_async::{AsyncConnection, scoped_futures::ScopedFutureExt};
    use garde::Validate;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::db::{
        model::{FetchByQuery, Write},
        test_util::{DbConnection, N_SCIENTISTS, db_conn},
    };

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn default_scientist_query(#[future] mut db_conn: DbConnection) {
        db_conn
            .test_transaction::<_, crate::db::error::Error, _>(|conn| {
                async move {
                    let query = ScientistQuery {
                        order_by: vec![ScientistOrdering {
                            column: ScientistOrdinalColumn::Name,
                            descending: false,
                        }],
                        ..Default::default()
                    };
                    let scientists = Scientist::fetch_by_query(&query, conn).await?;

                    assert_eq!(scientists.len(), N_SCIENTISTS);
                    assert_eq!(scientists[0].name, "scientist0");
                    assert_eq!(scientists[N_SCIENTISTS - 1].name, "scientist9");

                    Ok(())
                }
                .scope_boxed()
            })
            .await;
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn scientist_name_is_trimmed(#[future] mut db_conn: DbConnection) {
        db_conn
            .test_transaction::<_, crate::db::error::Error, _>(|conn| {
                async move {
                    let new = NewScientist {
                        name: "  Rosalind Franklin ".to_string(),
                        email: "rosalind@example.com".to_string(),
                    };
                    new.validate().unwrap();

                    let created = new.write(conn).await?;
                    assert_eq!(created.name, "Rosalind Franklin");

                    Ok(())
                }
                .scope_boxed()
            })
            .await;
    }

    #[test]
    fn blank_scientist_name_is_rejected() {
        let new = NewScientist {
            name: "   ".to_string(),
            email: "someone@example.com".to_string(),
        };

        assert!(new.validate().is_err());
    }
}
