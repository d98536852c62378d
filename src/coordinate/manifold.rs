use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use super::{
    marshal::{MarshalReader, MarshalWriter, Marshalable},
    Activity, EditCoordinate, LanguageCoordinate, LogicCoordinate, NavigationCoordinate, Premise,
    StampFilter, VertexSort,
};
use crate::error::KometError;

/// Everything needed to render one consistent view. Taxonomy snapshots are cached per value.
///
/// The view filter selects the logic graphs (edges) that are navigated; the vertex filter
/// decides which concepts (vertices) are visible at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifoldCoordinate {
    pub view_filter: StampFilter,
    pub vertex_filter: StampFilter,
    pub language: LanguageCoordinate,
    pub vertex_sort: VertexSort,
    pub navigation: NavigationCoordinate,
    pub logic: LogicCoordinate,
    pub activity: Activity,
    pub edit: EditCoordinate,
}

impl ManifoldCoordinate {
    /// A manifold whose vertex filter is its view filter.
    pub fn new(
        view_filter: StampFilter,
        language: LanguageCoordinate,
        premise: Premise,
        logic: LogicCoordinate,
        edit: EditCoordinate,
    ) -> Self {
        ManifoldCoordinate {
            vertex_filter: view_filter.clone(),
            view_filter,
            language,
            vertex_sort: VertexSort::Natural,
            navigation: NavigationCoordinate::for_premise(premise, &logic),
            logic,
            activity: Activity::Viewing,
            edit,
        }
    }

    pub fn development_stated() -> Self {
        Self::new(
            StampFilter::development_latest_active_only(),
            LanguageCoordinate::us_english_regular_name(),
            Premise::Stated,
            LogicCoordinate::el_plus_plus(),
            EditCoordinate::default(),
        )
    }

    pub fn development_inferred() -> Self {
        Self::development_stated().with_premise(Premise::Inferred)
    }

    /// Navigated premise, when the navigation coordinate covers exactly one side.
    pub fn premise(&self) -> Option<Premise> {
        self.navigation.premise(&self.logic)
    }

    /// Same view at `time`; both filters move.
    pub fn make_coordinate_analog(&self, time: i64) -> Self {
        ManifoldCoordinate {
            view_filter: self.view_filter.make_coordinate_analog(time),
            vertex_filter: self.vertex_filter.make_coordinate_analog(time),
            ..self.clone()
        }
    }

    pub fn with_premise(&self, premise: Premise) -> Self {
        ManifoldCoordinate {
            navigation: NavigationCoordinate::for_premise(premise, &self.logic),
            ..self.clone()
        }
    }

    pub fn with_activity(&self, activity: Activity) -> Self {
        ManifoldCoordinate {
            activity,
            ..self.clone()
        }
    }

    pub fn with_vertex_sort(&self, vertex_sort: VertexSort) -> Self {
        ManifoldCoordinate {
            vertex_sort,
            ..self.clone()
        }
    }

    pub fn with_view_filter(&self, filter: StampFilter) -> Self {
        ManifoldCoordinate {
            view_filter: filter,
            ..self.clone()
        }
    }

    pub fn with_vertex_filter(&self, filter: StampFilter) -> Self {
        ManifoldCoordinate {
            vertex_filter: filter,
            ..self.clone()
        }
    }

    pub fn with_language(&self, language: LanguageCoordinate) -> Self {
        ManifoldCoordinate {
            language,
            ..self.clone()
        }
    }

    pub fn to_user_string(&self) -> String {
        let premise = match self.premise() {
            Some(Premise::Stated) => "stated",
            Some(Premise::Inferred) => "inferred",
            None => "mixed",
        };
        format!(
            "{:?} {premise} view at {} in {}",
            self.activity, self.view_filter, self.language
        )
    }
}

impl Display for ManifoldCoordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_user_string())
    }
}

impl Marshalable for ManifoldCoordinate {
    const RECORD: &'static str = "manifold coordinate";

    fn write_fields(&self, version: u32, out: &mut MarshalWriter) -> Result<(), KometError> {
        self.view_filter.marshal_into(version, out)?;
        if version >= 2 {
            self.vertex_filter.marshal_into(version, out)?;
        }
        self.language.marshal_into(version, out)?;
        out.put_u8(self.vertex_sort.to_byte());
        self.navigation.marshal_into(version, out)?;
        self.logic.marshal_into(version, out)?;
        if version >= 2 {
            out.put_u8(self.activity.to_byte());
        }
        self.edit.marshal_into(version, out)
    }

    fn read_fields(version: u32, input: &mut MarshalReader) -> Result<Self, KometError> {
        let view_filter = StampFilter::unmarshal_from(input)?;
        let vertex_filter = if version >= 2 {
            StampFilter::unmarshal_from(input)?
        } else {
            view_filter.clone()
        };
        let language = LanguageCoordinate::unmarshal_from(input)?;
        let vertex_sort = VertexSort::from_byte(input.get_u8()?)?;
        let navigation = NavigationCoordinate::unmarshal_from(input)?;
        let logic = LogicCoordinate::unmarshal_from(input)?;
        let activity = if version >= 2 {
            Activity::from_byte(input.get_u8()?)?
        } else {
            Activity::Viewing
        };
        let edit = EditCoordinate::unmarshal_from(input)?;
        Ok(ManifoldCoordinate {
            view_filter,
            vertex_filter,
            language,
            vertex_sort,
            navigation,
            logic,
            activity,
            edit,
        })
    }
}
