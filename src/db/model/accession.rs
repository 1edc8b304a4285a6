use chrono::{DateTime, Utc};
use diesel::{pg::Pg, prelude::*};
use diesel_async::{AsyncConnection, RunQueryDsl, scoped_futures::ScopedFutureExt};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use valuable::Valuable;

use crate::{
    db::{
        model::{self, AsDieselQueryBase, Pagination, experiment, non_blank},
        util::{AsIlike, BoxedDieselExpression, DieselExpressionBuilder},
    },
    fetch_by_query,
    schema::{
        self, accession_mapping,
        accession::{self, created_at as created_at_col, id as id_col, name as name_col},
    },
};

/// Mapping rows are inserted in chunks of this size. Purely an insert-loop
/// tuning constant; a multi-chunk import is still one transaction.
pub const MAPPING_BATCH_SIZE: usize = 100;

#[derive(Deserialize, Serialize, Clone, Valuable, Validate)]
#[garde(allow_unvalidated)]
pub struct NewAccession {
    #[garde(custom(non_blank))]
    pub name: String,
}

impl model::Write for NewAccession {
    type Returns = Accession;

    async fn write(
        self,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Self::Returns> {
        let Self { name } = self;

        let inserted = diesel::insert_into(accession::table)
            .values((id_col.eq(Uuid::now_v7()), name_col.eq(name.trim())))
            .returning(Accession::as_returning())
            .get_result(db_conn)
            .await?;

        Ok(inserted)
    }
}

/// One plant-barcode → genotype pair, as parsed from a mapping spreadsheet or
/// supplied directly. The genotype may be empty; it can be filled in later by
/// an inline edit.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Valuable, Validate)]
#[garde(allow_unvalidated)]
pub struct NewMapping {
    #[garde(custom(non_blank))]
    pub plant_barcode: String,
    #[serde(default)]
    pub genotype_id: String,
}

#[derive(Deserialize, Serialize, Clone, Valuable, Validate)]
pub struct NewAccessionWithMappings {
    #[garde(dive)]
    pub accession: NewAccession,
    #[garde(dive)]
    pub mappings: Vec<NewMapping>,
}

#[derive(Serialize, Debug)]
pub struct ImportedAccession {
    pub accession: Accession,
    pub n_mappings: usize,
}

impl model::Write for NewAccessionWithMappings {
    type Returns = ImportedAccession;

    // The accession and every mapping row commit together or not at all.
    async fn write(
        self,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Self::Returns> {
        let Self {
            accession: new_accession,
            mappings,
        } = self;

        db_conn
            .transaction(|conn| {
                async move {
                    let accession = new_accession.write(conn).await?;

                    let mut n_mappings = 0;
                    for batch in crate::import::batch::into_batches(mappings) {
                        let rows: Vec<_> = batch
                            .into_iter()
                            .map(|mapping| {
                                let NewMapping {
                                    plant_barcode,
                                    genotype_id,
                                } = mapping;

                                (
                                    accession_mapping::id.eq(Uuid::now_v7()),
                                    accession_mapping::accession_id.eq(accession.id),
                                    accession_mapping::plant_barcode
                                        .eq(plant_barcode.trim().to_string()),
                                    accession_mapping::genotype_id
                                        .eq(genotype_id.trim().to_string()),
                                )
                            })
                            .collect();

                        n_mappings += diesel::insert_into(accession_mapping::table)
                            .values(rows)
                            .execute(conn)
                            .await?;
                    }

                    Ok(ImportedAccession {
                        accession,
                        n_mappings,
                    })
                }
                .scope_boxed()
            })
            .await
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = schema::accession, check_for_backend(Pg))]
pub struct Accession {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = schema::accession_mapping, check_for_backend(Pg))]
pub struct Mapping {
    pub id: Uuid,
    pub accession_id: Uuid,
    pub plant_barcode: String,
    pub genotype_id: String,
}

#[derive(Identifiable, AsChangeset, Deserialize, Serialize, Valuable, Validate)]
#[diesel(table_name = schema::accession, check_for_backend(Pg))]
#[garde(allow_unvalidated)]
pub struct AccessionUpdate {
    #[valuable(skip)]
    pub id: Uuid,
    #[garde(custom(non_blank))]
    pub name: String,
}

impl model::Write for AccessionUpdate {
    type Returns = Accession;

    async fn write(
        self,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Self::Returns> {
        let Self { id, name } = self;

        Ok(diesel::update(accession::table.find(id))
            .set(name_col.eq(name.trim()))
            .returning(Accession::as_returning())
            .get_result(db_conn)
            .await?)
    }
}

#[derive(Identifiable, AsChangeset, Deserialize, Serialize, Valuable, Validate)]
#[diesel(table_name = schema::accession_mapping, check_for_backend(Pg))]
#[garde(allow_unvalidated)]
pub struct MappingUpdate {
    #[valuable(skip)]
    pub id: Uuid,
    pub genotype_id: String,
}

impl model::Write for MappingUpdate {
    type Returns = Mapping;

    async fn write(
        self,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Self::Returns> {
        let Self { id, genotype_id } = self;

        Ok(diesel::update(accession_mapping::table.find(id))
            .set(accession_mapping::genotype_id.eq(genotype_id.trim().to_string()))
            .returning(Mapping::as_returning())
            .get_result(db_conn)
            .await?)
    }
}

/// Deletes an accession and, through the schema's cascade, all of its
/// mappings in the same transaction.
pub async fn delete_accession(
    accession_id: &Uuid,
    db_conn: &mut diesel_async::AsyncPgConnection,
) -> super::error::Result<()> {
    let n_deleted = diesel::delete(accession::table.find(accession_id))
        .execute(db_conn)
        .await?;

    if n_deleted == 0 {
        return Err(super::error::Error::RecordNotFound);
    }

    Ok(())
}

impl AsDieselQueryBase for Accession {
    type QueryBase = accession::table;

    fn as_diesel_query_base() -> Self::QueryBase {
        accession::table
    }
}

impl model::FetchById for Accession {
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

impl model::FetchRelatives<Mapping> for accession::table {
    type Id = Uuid;

    /// All mappings for an accession, ordered by plant barcode ascending.
    /// An unknown accession yields an empty list, not an error.
    async fn fetch_relatives(
        accession_id: &Self::Id,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Vec<Mapping>> {
        let mappings = accession_mapping::table
            .filter(accession_mapping::accession_id.eq(accession_id))
            .select(Mapping::as_select())
            .order((
                accession_mapping::plant_barcode.asc(),
                accession_mapping::id.asc(),
            ))
            .load(db_conn)
            .await?;

        Ok(mappings)
    }
}

/// The distinct plant barcodes of an accession, sorted, for autocomplete.
pub async fn plant_barcodes(
    accession_id: &Uuid,
    db_conn: &mut diesel_async::AsyncPgConnection,
) -> super::error::Result<Vec<String>> {
    let barcodes = accession_mapping::table
        .filter(accession_mapping::accession_id.eq(accession_id))
        .select(accession_mapping::plant_barcode)
        .distinct()
        .order(accession_mapping::plant_barcode.asc())
        .load(db_conn)
        .await?;

    Ok(barcodes)
}

/// The genotype mapped to a barcode within one accession. Exact,
/// case-sensitive match. When the accession holds the same barcode more than
/// once (replicate plants), the most recently inserted mapping wins.
pub async fn genotype_in_accession(
    accession_id: &Uuid,
    plant_barcode: &str,
    db_conn: &mut diesel_async::AsyncPgConnection,
) -> super::error::Result<Option<String>> {
    let genotype = accession_mapping::table
        .filter(
            accession_mapping::accession_id
                .eq(accession_id)
                .and(accession_mapping::plant_barcode.eq(plant_barcode)),
        )
        .select(accession_mapping::genotype_id)
        .order(accession_mapping::id.desc())
        .first(db_conn)
        .await
        .optional()?;

    Ok(genotype)
}

/// Resolves an experiment's attached accession and looks the barcode up in
/// it. `None` when the experiment has no accession or nothing matches;
/// absence is never an error.
pub async fn genotype_for_barcode(
    plant_barcode: &str,
    experiment_id: &Uuid,
    db_conn: &mut diesel_async::AsyncPgConnection,
) -> super::error::Result<Option<String>> {
    let Some(accession_id) = experiment::attached_accession(experiment_id, db_conn).await? else {
        return Ok(None);
    };

    genotype_in_accession(&accession_id, plant_barcode, db_conn).await
}

#[derive(Deserialize, Serialize, Clone, Copy, Default, Valuable, Debug)]
#[serde(rename_all = "snake_case")]
pub enum AccessionOrdinalColumn {
    #[default]
    Name,
    CreatedAt,
}

#[derive(Deserialize, Serialize, Clone, Copy, Valuable, Debug)]
pub struct AccessionOrdering {
    #[serde(default)]
    pub column: AccessionOrdinalColumn,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Deserialize, Serialize, Default, Valuable, Validate, Debug)]
#[garde(allow_unvalidated)]
pub struct AccessionQuery {
    #[serde(default)]
    #[valuable(skip)]
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order_by: Vec<AccessionOrdering>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl<QuerySource> model::AsDieselFilter<QuerySource> for AccessionQuery
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

impl model::FetchByQuery for Accession {
    type QueryParams = AccessionQuery;

    async fn fetch_by_query(
        query: &Self::QueryParams,
        db_conn: &mut diesel_async::AsyncPgConnection,
    ) -> super::error::Result<Vec<Self>> {
        use AccessionOrdinalColumn::{CreatedAt, Name};

        fetch_by_query!(query, [(Name, name_col), (CreatedAt, created_at_col)], db_conn)
    }
}
