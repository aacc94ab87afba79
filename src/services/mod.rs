//! Roster Services - collaborators the stages delegate to
//!
//! Record construction and the cross-relation side effects of a move, an
//! arrival or a departure live behind [`RosterServices`], so the stages only
//! decide *what* happens. [`TabularServices`] is the implementation that
//! works directly on the Master dataset's relations.

pub mod reference;
pub mod tabular;

pub use reference::{PositionInfo, ReferenceData};
pub use tabular::TabularServices;

use crate::error::Result;
use crate::relation::{Dataset, FieldMap, Relation, RowPos};

/// A position change for a person already on the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    /// Row of the person in the Master OOS relation
    pub row: RowPos,
    pub full_name: String,
    pub old_index: String,
    pub new_index: String,
    pub order_number: String,
    pub order_date: String,
    pub effective_date: String,
}

pub trait RosterServices {
    /// Populate position-index → post metadata.
    fn load_index_maps(&mut self, master: &Dataset) -> Result<()>;

    /// Populate division code → division metadata.
    fn load_division_maps(&mut self, master: &Dataset) -> Result<()>;

    /// Compute the pool of vacant position indexes, given the relation and
    /// column that hold the occupied ones.
    fn prepare_free_cadet_indexes(&mut self, relation: &Relation, column: &str) -> Result<()>;

    /// Archive the timesheet row of a person leaving the roster. Returns
    /// whether a row was archived.
    fn archive_timesheet_row(&mut self, master: &mut Dataset, position_index: &str) -> Result<bool>;

    /// Move a person to another post, with all dependent updates.
    fn move_person(&mut self, master: &mut Dataset, request: &MoveRequest) -> Result<()>;

    /// Add a new person to the roster. `position_index` is the index Source
    /// assigns, possibly empty. Returns the index actually occupied, or
    /// `None` when no post could be claimed.
    fn register_new_oos(
        &mut self,
        master: &mut Dataset,
        fields: &FieldMap,
        position_index: &str,
    ) -> Result<Option<String>>;

    /// Add an attached-personnel record. Returns its administrative index.
    fn add_attached(&mut self, master: &mut Dataset, fields: &FieldMap) -> Result<String>;

    /// Administrative index for an attachment.
    fn generate_attached_index(&mut self, arrival: &str, departure: &str) -> String;

    /// Division name for a division code, when known.
    fn division_name(&self, code: &str) -> Option<String>;
}
