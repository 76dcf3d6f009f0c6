use std::{cell::RefCell, fmt, ops::Range, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::{
    EntityId, Position,
    constants::{Color, Direction, ObjType},
    error::{Error, Result},
    rendering::Image,
    state::{StateArray, Values},
    world_object::{EMPTY_RECORD, OBJ_DIM, WorldObj, render_agent_triangle},
};

/// Width of an agent record.
pub const AGENT_DIM: usize = 6 + OBJ_DIM;

const TYPE: usize = 0;
const COLOR: usize = 1;
const DIR: usize = 2;
const POS: Range<usize> = 3..5;
const TERMINATED: usize = 5;
const CARRYING: usize = 6;

const UNSET: i32 = -1;

type CarriedTable = Rc<RefCell<Vec<Option<WorldObj>>>>;

/// State of one agent, or of a batch of agents.
///
/// Indexing a batch yields views that share storage with it, so writes
/// through either side are visible to the other:
///
/// ```
/// use multigrid_core::{agent::AgentState, constants::Color, state::Values};
///
/// let agents = AgentState::new(&[3]);
/// let first = agents.index(0).unwrap();
/// first.set_color(Color::Yellow);
/// assert_eq!(
///     agents.color().unwrap(),
///     Values::Batch(vec![Color::Yellow, Color::Green, Color::Blue]),
/// );
/// ```
///
/// Carried objects are kept in a side table parallel to the records, since
/// a cell record alone cannot preserve object identity.
#[derive(Clone)]
pub struct AgentState {
    array: StateArray,
    carried: CarriedTable,
}

impl AgentState {
    /// Allocates agent records of the given dims.
    ///
    /// Every agent starts unplaced, facing nowhere, not terminated and
    /// carrying nothing; colors cycle through [`Color::ALL`] by flat index.
    pub fn new(dims: &[usize]) -> Self {
        let array = StateArray::zeros(dims, AGENT_DIM);
        array.fill(TYPE, ObjType::Agent.to_index());
        array.fill(DIR, UNSET);
        array.fill(POS.start, UNSET);
        array.fill(POS.start + 1, UNSET);
        for pos in 0..array.len() {
            array.set(pos, COLOR, Color::cycle(pos).to_index());
            array.write_range(pos, CARRYING, &EMPTY_RECORD);
        }
        let carried = Rc::new(RefCell::new(vec![None; array.len()]));
        AgentState { array, carried }
    }

    fn view(&self, array: StateArray) -> Self {
        AgentState {
            array,
            carried: Rc::clone(&self.carried),
        }
    }

    /// The underlying agent records.
    pub fn array(&self) -> &StateArray {
        &self.array
    }

    /// Leading dims; empty for a single agent.
    pub fn dims(&self) -> &[usize] {
        self.array.dims()
    }

    /// Whether this view holds exactly one agent.
    pub fn is_scalar(&self) -> bool {
        self.array.is_scalar()
    }

    /// Number of agents covered by this view.
    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// View of one entry along the first axis, sharing records and carried objects.
    pub fn index(&self, index: usize) -> Result<Self> {
        Ok(self.view(self.array.index(index)?))
    }

    /// View of a contiguous run along the first axis. Fails on a scalar view.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        Ok(self.view(self.array.slice(range)?))
    }

    /// 1-D view of the agents where `mask` is true.
    pub fn select(&self, mask: &[bool]) -> Result<Self> {
        Ok(self.view(self.array.select(mask)?))
    }

    /// Scalar view of the agent at a full coordinate.
    pub fn at(&self, coords: &[usize]) -> Result<Self> {
        Ok(self.view(self.array.at(coords)?))
    }

    /// Whether both views write through to the same records.
    pub fn shares_storage(&self, other: &AgentState) -> bool {
        self.array.shares_storage(&other.array)
    }

    /// Color of each agent.
    pub fn color(&self) -> Result<Values<Color>> {
        self.array.field(COLOR).try_map(Color::from_index)
    }

    /// Gives every agent in this view `color`.
    pub fn set_color(&self, color: Color) {
        self.array.fill(COLOR, color.to_index());
    }

    /// Assigns one color per agent, in view order.
    pub fn set_colors(&self, colors: &[Color]) -> Result<()> {
        let codes: Vec<i32> = colors.iter().map(|c| c.to_index()).collect();
        self.array.write(COLOR, &codes)
    }

    /// Facing of each agent; `None` until a direction is assigned.
    pub fn dir(&self) -> Result<Values<Option<Direction>>> {
        self.array.field(DIR).try_map(decode_dir)
    }

    pub fn set_dir(&self, dir: Option<Direction>) {
        self.array.fill(DIR, encode_dir(dir));
    }

    /// Assigns one direction per agent, in view order.
    pub fn set_dirs(&self, dirs: &[Option<Direction>]) -> Result<()> {
        let codes: Vec<i32> = dirs.iter().copied().map(encode_dir).collect();
        self.array.write(DIR, &codes)
    }

    /// Position of each agent; `None` until placed.
    pub fn pos(&self) -> Values<Option<Position>> {
        let positions = (0..self.len())
            .map(|i| self.pos_at(i))
            .collect::<Vec<_>>();
        self.shape_like(positions)
    }

    pub fn set_pos(&self, pos: Option<Position>) {
        let record = encode_pos(pos);
        for i in 0..self.len() {
            self.array.write_range(i, POS.start, &record);
        }
    }

    /// Assigns one position per agent, in view order.
    pub fn set_positions(&self, positions: &[Option<Position>]) -> Result<()> {
        self.check_len(positions.len())?;
        for (i, &pos) in positions.iter().enumerate() {
            self.array.write_range(i, POS.start, &encode_pos(pos));
        }
        Ok(())
    }

    /// Whether each agent has finished its episode.
    pub fn terminated(&self) -> Values<bool> {
        self.array.field(TERMINATED).map(|v| v != 0)
    }

    pub fn set_terminated(&self, terminated: bool) {
        self.array.fill(TERMINATED, terminated as i32);
    }

    pub fn set_terminated_flags(&self, flags: &[bool]) -> Result<()> {
        let codes: Vec<i32> = flags.iter().map(|&f| f as i32).collect();
        self.array.write(TERMINATED, &codes)
    }

    /// Objects carried by each agent, as the same handles that were stored.
    pub fn carrying(&self) -> Values<Option<WorldObj>> {
        let table = self.carried.borrow();
        let objects = self
            .array
            .record_ids()
            .iter()
            .map(|&id| table[id].clone())
            .collect::<Vec<_>>();
        drop(table);
        self.shape_like(objects)
    }

    /// Gives every agent in this view `obj` (or nothing).
    pub fn set_carrying(&self, obj: Option<&WorldObj>) {
        let record = obj.map_or(EMPTY_RECORD, WorldObj::encode);
        let mut table = self.carried.borrow_mut();
        for (i, &id) in self.array.record_ids().iter().enumerate() {
            self.array.write_range(i, CARRYING, &record);
            table[id] = obj.cloned();
        }
    }

    /// Assigns one carried object (or nothing) per agent, in view order.
    pub fn set_carried_objects(&self, objects: &[Option<WorldObj>]) -> Result<()> {
        self.check_len(objects.len())?;
        let mut table = self.carried.borrow_mut();
        for (i, (&id, obj)) in self.array.record_ids().iter().zip(objects).enumerate() {
            let record = obj.as_ref().map_or(EMPTY_RECORD, WorldObj::encode);
            self.array.write_range(i, CARRYING, &record);
            table[id] = obj.clone();
        }
        Ok(())
    }

    /// Numeric record of each agent's carried object.
    pub fn carrying_records(&self) -> Vec<[i32; OBJ_DIM]> {
        self.array
            .column(CARRYING..AGENT_DIM)
            .chunks_exact(OBJ_DIM)
            .map(|c| [c[0], c[1], c[2]])
            .collect()
    }

    fn pos_at(&self, i: usize) -> Option<Position> {
        let xy = self.array.column_of(i, POS);
        decode_pos(xy[0], xy[1])
    }

    fn check_len(&self, actual: usize) -> Result<()> {
        if actual == self.len() {
            Ok(())
        } else {
            Err(Error::shape(self.len(), actual))
        }
    }

    fn shape_like<T>(&self, mut values: Vec<T>) -> Values<T> {
        match (self.is_scalar(), values.pop()) {
            (true, Some(v)) => Values::Scalar(v),
            (_, last) => {
                values.extend(last);
                Values::Batch(values)
            }
        }
    }

    // Single-record readers used by `Agent`, whose state is always scalar.

    fn first_color(&self) -> Result<Color> {
        Color::from_index(self.array.get(0, COLOR))
    }

    fn first_dir(&self) -> Result<Option<Direction>> {
        decode_dir(self.array.get(0, DIR))
    }

    fn first_carrying(&self) -> Option<WorldObj> {
        let id = self.array.record_ids()[0];
        self.carried.borrow()[id].clone()
    }
}

fn decode_dir(code: i32) -> Result<Option<Direction>> {
    match code {
        UNSET => Ok(None),
        _ => Direction::from_index(code).map(Some),
    }
}

fn encode_dir(dir: Option<Direction>) -> i32 {
    dir.map_or(UNSET, Direction::to_index)
}

fn decode_pos(x: i32, y: i32) -> Option<Position> {
    (x != UNSET || y != UNSET).then_some(Position { x, y })
}

fn encode_pos(pos: Option<Position>) -> [i32; 2] {
    pos.map_or([UNSET, UNSET], |p| [p.x, p.y])
}

impl PartialEq for AgentState {
    fn eq(&self, other: &Self) -> bool {
        self.array == other.array
    }
}

impl fmt::Debug for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = self
            .dims()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        write!(f, "AgentState({})", dims.join(", "))
    }
}

/// Immutable per-agent settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Width and height of the agent's square view, in cells. Odd, at least 3.
    pub view_size: usize,
    pub see_through_walls: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            view_size: 7,
            see_through_walls: false,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.view_size < 3 || self.view_size % 2 == 0 {
            return Err(Error::invalid("view_size", self.view_size));
        }
        Ok(())
    }
}

/// Task description handed to an agent for an episode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mission(String);

impl Mission {
    pub fn new(text: impl Into<String>) -> Self {
        Mission(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Mission {
    fn default() -> Self {
        Mission::new("maximize reward")
    }
}

impl fmt::Display for Mission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An agent in a grid world.
///
/// Cloning yields another handle to the same agent: the state record and
/// the mission are shared.
#[derive(Clone)]
pub struct Agent {
    index: EntityId,
    state: AgentState,
    mission: Rc<RefCell<Option<Mission>>>,
    config: AgentConfig,
}

impl Agent {
    /// Creates an agent backed by its own standalone record.
    pub fn new(index: EntityId, config: AgentConfig) -> Result<Self> {
        Self::with_state(index, config, AgentState::new(&[]))
    }

    /// Creates an agent backed by one record of a shared [`AgentState`].
    ///
    /// `state` must be a scalar view, typically `batch.index(i)`.
    pub fn with_state(index: EntityId, config: AgentConfig, state: AgentState) -> Result<Self> {
        config.validate()?;
        if !state.is_scalar() {
            return Err(Error::shape(1, state.len()));
        }
        Ok(Agent {
            index,
            state,
            mission: Rc::new(RefCell::new(None)),
            config,
        })
    }

    pub fn index(&self) -> EntityId {
        self.index
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn view_size(&self) -> usize {
        self.config.view_size
    }

    pub fn see_through_walls(&self) -> bool {
        self.config.see_through_walls
    }

    pub fn mission(&self) -> Option<Mission> {
        self.mission.borrow().clone()
    }

    pub fn color(&self) -> Result<Color> {
        self.state.first_color()
    }

    pub fn set_color(&self, color: Color) {
        self.state.set_color(color);
    }

    pub fn dir(&self) -> Result<Option<Direction>> {
        self.state.first_dir()
    }

    pub fn set_dir(&self, dir: Option<Direction>) {
        self.state.set_dir(dir);
    }

    pub fn pos(&self) -> Option<Position> {
        self.state.pos_at(0)
    }

    pub fn set_pos(&self, pos: Option<Position>) {
        self.state.set_pos(pos);
    }

    pub fn terminated(&self) -> bool {
        self.state.array.get(0, TERMINATED) != 0
    }

    pub fn set_terminated(&self, terminated: bool) {
        self.state.set_terminated(terminated);
    }

    pub fn carrying(&self) -> Option<WorldObj> {
        self.state.first_carrying()
    }

    pub fn set_carrying(&self, obj: Option<&WorldObj>) {
        self.state.set_carrying(obj);
    }

    /// Whether both handles refer to the same agent.
    pub fn ptr_eq(&self, other: &Agent) -> bool {
        Rc::ptr_eq(&self.mission, &other.mission)
    }

    /// Position of the cell directly in front of the agent.
    ///
    /// `None` while the agent is unplaced or has no direction.
    pub fn front_pos(&self) -> Option<Position> {
        let pos = self.pos()?;
        let (dx, dy) = self.dir().ok()??.to_vec();
        Some(Position {
            x: pos.x + dx,
            y: pos.y + dy,
        })
    }

    /// Clears per-episode state and installs a new mission.
    pub fn reset(&self, mission: Mission) {
        *self.mission.borrow_mut() = Some(mission);
        self.state.set_pos(None);
        self.state.set_dir(None);
        self.state.set_terminated(false);
        self.state.set_carrying(None);
    }

    /// `(type_index, color_index, dir_index)`, with `-1` for an unset direction.
    pub fn encode(&self) -> [i32; OBJ_DIM] {
        [
            ObjType::Agent.to_index(),
            self.state.array.get(0, COLOR),
            self.state.array.get(0, DIR),
        ]
    }

    /// Draws the agent as a triangle pointing along its direction.
    pub fn render(&self, img: &mut Image) -> Result<()> {
        let color = self.color()?.rgb();
        render_agent_triangle(img, self.state.array.get(0, DIR), color);
        Ok(())
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("index", &self.index)
            .field("record", &self.encode())
            .field("pos", &self.pos())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DoorState;

    #[test]
    fn batch_defaults() {
        let agents = AgentState::new(&[3]);
        assert_eq!(format!("{agents:?}"), "AgentState(3)");
        assert_eq!(agents.dir().unwrap(), Values::Batch(vec![None; 3]));
        assert_eq!(agents.pos(), Values::Batch(vec![None; 3]));
        assert_eq!(agents.terminated(), Values::Batch(vec![false; 3]));
        assert_eq!(
            agents.color().unwrap(),
            Values::Batch(vec![Color::Red, Color::Green, Color::Blue])
        );
        assert_eq!(agents.carrying_records(), vec![EMPTY_RECORD; 3]);
        assert_eq!(format!("{:?}", agents.index(0).unwrap()), "AgentState()");
    }

    #[test]
    fn single_agent_state_cannot_be_sliced() {
        let single = AgentState::new(&[]);
        assert!(matches!(
            single.slice(0..0),
            Err(Error::IndexOutOfRange { len: 0, .. })
        ));
        let agents = AgentState::new(&[3]);
        assert!(agents.index(0).unwrap().slice(0..1).is_err());
        assert_eq!(agents.slice(1..3).unwrap().len(), 2);
    }

    #[test]
    fn scalar_write_is_visible_in_batch() {
        let agents = AgentState::new(&[3]);
        agents.index(1).unwrap().set_color(Color::Yellow);
        assert_eq!(
            agents.color().unwrap(),
            Values::Batch(vec![Color::Red, Color::Yellow, Color::Blue])
        );
    }

    #[test]
    fn batch_broadcast_is_visible_in_scalars() {
        let agents = AgentState::new(&[4]);
        agents.set_dir(Some(Direction::Left));
        for k in 0..4 {
            assert_eq!(
                agents.index(k).unwrap().dir().unwrap(),
                Values::Scalar(Some(Direction::Left))
            );
        }
        agents.index(2).unwrap().set_dir(Some(Direction::Up));
        assert_eq!(
            agents.dir().unwrap(),
            Values::Batch(vec![
                Some(Direction::Left),
                Some(Direction::Left),
                Some(Direction::Up),
                Some(Direction::Left),
            ])
        );
    }

    #[test]
    fn sequence_assignment_checks_length() {
        let agents = AgentState::new(&[2]);
        let err = agents.set_terminated_flags(&[true]).unwrap_err();
        assert_eq!(err, Error::ShapeMismatch { expected: 2, actual: 1 });
        agents
            .set_positions(&[Some(Position { x: 1, y: 2 }), None])
            .unwrap();
        assert_eq!(
            agents.pos(),
            Values::Batch(vec![Some(Position { x: 1, y: 2 }), None])
        );
    }

    #[test]
    fn carried_objects_follow_indexing() {
        let agents = AgentState::new(&[3]);
        let key = WorldObj::key(Color::Purple);
        agents.index(2).unwrap().set_carrying(Some(&key));

        let tail = agents.slice(1..3).unwrap();
        let carried = tail.carrying().into_vec();
        assert!(carried[0].is_none());
        assert!(carried[1].as_ref().is_some_and(|obj| obj.ptr_eq(&key)));

        let masked = agents.select(&[false, false, true]).unwrap();
        assert_eq!(masked.carrying_records(), vec![key.encode()]);
        assert_eq!(agents.carrying_records()[0], EMPTY_RECORD);
    }

    #[test]
    fn agent_accessors_alias_shared_batch() {
        let agents = AgentState::new(&[2]);
        let agent = Agent::with_state(1, AgentConfig::default(), agents.index(1).unwrap()).unwrap();
        agent.set_pos(Some(Position { x: 2, y: 5 }));
        agent.set_terminated(true);
        assert_eq!(
            agents.pos(),
            Values::Batch(vec![None, Some(Position { x: 2, y: 5 })])
        );
        assert_eq!(agents.terminated(), Values::Batch(vec![false, true]));
        assert_eq!(agent.color(), Ok(Color::Green));
    }

    #[test]
    fn with_state_rejects_batches_and_bad_views() {
        let agents = AgentState::new(&[2]);
        assert!(matches!(
            Agent::with_state(0, AgentConfig::default(), agents.clone()),
            Err(Error::ShapeMismatch { .. })
        ));
        for view_size in [2, 1, 8] {
            let config = AgentConfig {
                view_size,
                ..AgentConfig::default()
            };
            assert!(matches!(
                Agent::new(0, config),
                Err(Error::InvalidFieldValue { field: "view_size", .. })
            ));
        }
    }

    #[test]
    fn front_pos_follows_direction() {
        let agent = Agent::new(0, AgentConfig::default()).unwrap();
        assert_eq!(agent.front_pos(), None);
        agent.set_pos(Some(Position { x: 3, y: 3 }));
        assert_eq!(agent.front_pos(), None);
        for (dir, expected) in [
            (Direction::Right, (4, 3)),
            (Direction::Down, (3, 4)),
            (Direction::Left, (2, 3)),
            (Direction::Up, (3, 2)),
        ] {
            agent.set_dir(Some(dir));
            let front = agent.front_pos().unwrap();
            assert_eq!((front.x, front.y), expected);
        }
    }

    #[test]
    fn reset_clears_episode_state() {
        let agent = Agent::new(4, AgentConfig::default()).unwrap();
        agent.set_pos(Some(Position { x: 1, y: 1 }));
        agent.set_dir(Some(Direction::Down));
        agent.set_terminated(true);
        agent.set_carrying(Some(&WorldObj::door(Color::Red, DoorState::Open)));

        agent.reset(Mission::new("get to the goal"));
        assert_eq!(agent.pos(), None);
        assert_eq!(agent.dir(), Ok(None));
        assert!(!agent.terminated());
        assert!(agent.carrying().is_none());
        assert_eq!(agent.state().carrying_records(), vec![EMPTY_RECORD]);
        assert_eq!(agent.mission().unwrap().as_str(), "get to the goal");
        assert_eq!(agent.index(), 4);
        assert_eq!(agent.view_size(), 7);
    }

    #[test]
    fn encode_reports_type_color_dir() {
        let agent = Agent::new(0, AgentConfig::default()).unwrap();
        assert_eq!(agent.encode(), [10, 0, -1]);
        agent.set_color(Color::Blue);
        agent.set_dir(Some(Direction::Up));
        assert_eq!(agent.encode(), [10, 2, 3]);
    }

    #[test]
    fn render_draws_in_agent_color() {
        let agent = Agent::new(0, AgentConfig::default()).unwrap();
        agent.set_dir(Some(Direction::Right));
        let mut img = Image::new(30, 30);
        agent.render(&mut img).unwrap();
        // apex points right: right of center is painted, far left edge is not
        assert_eq!(img.pixel(20, 15), Color::Red.rgb());
        assert_eq!(img.pixel(1, 15), [0, 0, 0]);
    }
}
