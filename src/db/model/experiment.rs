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
        experiment::{self, created_at as created_at_col, id as id_col, name as name_col},
    },
};

#[derive(Deserialize, Serialize, Clone, Valuable, Validate)]
#[garde(allow_unvalidated)]
pub struct NewExperiment {
    #[garde(custom(non_blank))]
    pub name: String,
    #[garde(custom(non_blank))]
    pub species: String,
    #[valuable(skip)]
    pub scientist_id: Uuid,
    /// An experiment may be created before its accession file exists.
    #[valuable(skip)]
    pub accession_id: Option<Uuid>,
}

impl model::Write for NewExperiment {
    type Returns = Experiment;

    async fn write(
        self,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Self::Returns> {
        let Self {
            name,
            species,
            scientist_id,
            accession_id,
        } = self;

        let inserted = diesel::insert_into(experiment::table)
            .values((
                id_col.eq(Uuid::now_v7()),
                name_col.eq(name.trim()),
                experiment::species.eq(species.trim()),
                experiment::scientist_id.eq(scientist_id),
                experiment::accession_id.eq(accession_id),
            ))
            .returning(Experiment::as_returning())
            .get_result(db_conn)
            .await?;

        Ok(inserted)
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = schema::experiment, check_for_backend(Pg))]
pub struct Experiment {
    pub id: Uuid,
    pub name: String,
    pub species: String,
    pub scientist_id: Uuid,
    pub accession_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Renames an experiment and/or attaches an accession to it. Attaching
/// replaces any previously attached accession.
#[derive(Identifiable, AsChangeset, Deserialize, Serialize, Valuable, Validate)]
#[diesel(table_name = schema::experiment, check_for_backend(Pg))]
#[garde(allow_unvalidated)]
pub struct ExperimentUpdate {
    #[valuable(skip)]
    pub id: Uuid,
    #[garde(inner(custom(non_blank)))]
    pub name: Option<String>,
    #[garde(inner(custom(non_blank)))]
    pub species: Option<String>,
    #[valuable(skip)]
    pub accession_id: Option<Uuid>,
}

impl model::Write for ExperimentUpdate {
    type Returns = Experiment;

    async fn write(
        self,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Self::Returns> {
        if let Self {
            name: None,
            species: None,
            accession_id: None,
            ..
        } = &self
        {
            return Experiment::fetch_by_id(&self.id, db_conn).await;
        }

        Ok(diesel::update(&self)
            .set(&self)
            .returning(Experiment::as_returning())
            .get_result(db_conn)
            .await?)
    }
}

impl AsDieselQueryBase for Experiment {
    type QueryBase = experiment::table;

    fn as_diesel_query_base() -> Self::QueryBase {
        experiment::table
    }
}

impl model::FetchById for Experiment {
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

/// The accession attached to an experiment, if any. A missing experiment is
/// reported the same way as a missing attachment so capture-time checks can
/// treat both as "validation unavailable".
pub async fn attached_accession(
    experiment_id: &Uuid,
    db_conn: &mut diesel_async::AsyncPgConnection,
) -> super::error::Result<Option<Uuid>> {
    let attached = experiment::table
        .find(experiment_id)
        .select(experiment::accession_id)
        .first::<Option<Uuid>>(db_conn)
        .await
        .optional()?;

    Ok(attached.flatten())
}

#[derive(Deserialize, Serialize, Clone, Copy, Default, Valuable, Debug)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentOrdinalColumn {
    #[default]
    Name,
    CreatedAt,
}

#[derive(Deserialize, Serialize, Clone, Copy, Valuable, Debug)]
pub struct ExperimentOrdering {
    #[serde(default)]
    pub column: ExperimentOrdinalColumn,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Deserialize, Serialize, Default, Valuable, Validate, Debug)]
#[garde(allow_unvalidated)]
pub struct ExperimentQuery {
    #[serde(default)]
    #[valuable(skip)]
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    #[valuable(skip)]
    pub scientist_id: Option<Uuid>,
    #[serde(default)]
    #[valuable(skip)]
    pub accession_id: Option<Uuid>,
    #[serde(default)]
    pub order_by: Vec<ExperimentOrdering>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl<QuerySource> model::AsDieselFilter<QuerySource> for ExperimentQuery
where
    id_col: SelectableExpression<QuerySource>,
    name_col: SelectableExpression<QuerySource>,
    experiment::scientist_id: SelectableExpression<QuerySource>,
    experiment::accession_id: SelectableExpression<QuerySource>,
    QuerySource: diesel::Table,
{
    fn as_diesel_filter<'a>(&'a self) -> Option<BoxedDieselExpression<'a, QuerySource>>
    where
        QuerySource: 'a,
    {
        let Self {
            ids,
            name,
            scientist_id,
            accession_id,
            ..
        } = self;

        let mut query = DieselExpressionBuilder::default();

        if !ids.is_empty() {
            query = query.and(id_col.eq_any(ids));
        }

        if let Some(name) = name {
            query = query.and(name_col.ilike(name.as_ilike()));
        }

        if let Some(scientist_id) = scientist_id {
            query = query.and(experiment::scientist_id.eq(scientist_id));
        }

        if let Some(accession_id) = accession_id {
            query = query.and(experiment::accession_id.eq(accession_id).assume_not_null());
        }

        query.build()
    }
}

impl model::FetchByQuery for Experiment {
    type QueryParams = ExperimentQuery;

    async fn fetch_by_query(
        query: &Self::QueryParams,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Vec<Self>> {
        use ExperimentOrdinalColumn::{CreatedAt, Name};

        fetch_by_query!(query, [(Name, name_col), (CreatedAt, created_at_col)], db_conn)
    }
}

#[cfg(test)]
mod tests {
    use diesel_async::{AsyncConnection, scoped_futures::ScopedFutureExt};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::db::{
        model::{FetchByQuery, Write, accession::NewAccession},
        test_util::{DbConnection, db_conn},
    };

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn attach_accession_to_experiment(#[future] mut db_conn: DbConnection) {
        db_conn
            .test_transaction::<_, crate::db::error::Error, _>(|conn| {
                async move {
                    let experiment = Experiment::fetch_by_query(
                        &ExperimentQuery {
                            name: Some("experiment1".to_string()),
                            ..Default::default()
                        },
                        conn,
                    )
                    .await?
                    .remove(0);
                    assert_eq!(experiment.accession_id, None);
                    assert_eq!(attached_accession(&experiment.id, conn).await?, None);

                    let accession = NewAccession {
                        name: "B73 mappings".to_string(),
                    }
                    .write(conn)
                    .await?;

                    let updated = ExperimentUpdate {
                        id: experiment.id,
                        name: None,
                        species: None,
                        accession_id: Some(accession.id),
                    }
                    .write(conn)
                    .await?;

                    assert_eq!(updated.accession_id, Some(accession.id));
                    assert_eq!(
                        attached_accession(&experiment.id, conn).await?,
                        Some(accession.id)
                    );

                    Ok(())
                }
                .scope_boxed()
            })
            .await;
    }

    #[rstest]
    #[awt]
    #[tokio::test]
    async fn missing_experiment_has_no_attached_accession(#[future] mut db_conn: DbConnection) {
        db_conn
            .test_transaction::<_, crate::db::error::Error, _>(|conn| {
                async move {
                    assert_eq!(attached_accession(&Uuid::now_v7(), conn).await?, None);

                    Ok(())
                }
                .scope_boxed()
            })
            .await;
    }
}
