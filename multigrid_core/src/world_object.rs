//! Cell records and the world object handles built on top of them.

use std::{cell::RefCell, f32::consts::FRAC_PI_2, fmt, ops::Range, rc::Rc};

use crate::{
    constants::{Color, DoorState, ObjType},
    error::{Error, Result},
    rendering::{
        Image, fill_coords, point_in_circle, point_in_line, point_in_rect, point_in_triangle,
        rotate_fn,
    },
    state::{StateArray, Values},
};

/// Width of a cell record.
pub const OBJ_DIM: usize = 3;

const TYPE: usize = 0;
const COLOR: usize = 1;
const STATE: usize = 2;

/// Cell record of a cell with nothing in it.
pub const EMPTY_RECORD: [i32; OBJ_DIM] = [ObjType::Empty.to_index(), 0, 0];

/// One or more cell records `(type, color, aux)`.
///
/// A grid stores a `WorldObjState` of dims `(width, height)`; a standalone
/// object holds a scalar one.
#[derive(Clone, PartialEq, Eq)]
pub struct WorldObjState {
    array: StateArray,
}

impl WorldObjState {
    /// Allocates records of the given dims, all empty.
    pub fn new(dims: &[usize]) -> Self {
        let array = StateArray::zeros(dims, OBJ_DIM);
        array.fill(TYPE, ObjType::Empty.to_index());
        WorldObjState { array }
    }

    /// A single record for `obj_type` in `color` with aux `0`.
    pub fn single(obj_type: ObjType, color: Color) -> Self {
        let state = WorldObjState::new(&[]);
        state.array.write_range(0, 0, &[obj_type.to_index(), color.to_index(), 0]);
        state
    }

    /// Wraps a generic record array; its records must be cell-record wide.
    pub fn from_array(array: StateArray) -> Result<Self> {
        if array.width() != OBJ_DIM {
            return Err(Error::shape(OBJ_DIM, array.width()));
        }
        Ok(WorldObjState { array })
    }

    /// The underlying records.
    pub fn array(&self) -> &StateArray {
        &self.array
    }

    /// Leading dims: `(width, height)` for a grid, empty for one object.
    pub fn dims(&self) -> &[usize] {
        self.array.dims()
    }

    pub fn is_scalar(&self) -> bool {
        self.array.is_scalar()
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// View of one entry along the first axis, e.g. one grid column.
    pub fn index(&self, index: usize) -> Result<Self> {
        Ok(WorldObjState {
            array: self.array.index(index)?,
        })
    }

    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        Ok(WorldObjState {
            array: self.array.slice(range)?,
        })
    }

    pub fn select(&self, mask: &[bool]) -> Result<Self> {
        Ok(WorldObjState {
            array: self.array.select(mask)?,
        })
    }

    /// Scalar view of one record, e.g. the cell at `[x, y]`.
    pub fn at(&self, coords: &[usize]) -> Result<Self> {
        Ok(WorldObjState {
            array: self.array.at(coords)?,
        })
    }

    /// Type of each record; fails on codes outside [`ObjType::ALL`].
    pub fn obj_type(&self) -> Result<Values<ObjType>> {
        self.array.field(TYPE).try_map(ObjType::from_index)
    }

    pub fn color(&self) -> Result<Values<Color>> {
        self.array.field(COLOR).try_map(Color::from_index)
    }

    /// Object-specific state, e.g. the door state code.
    pub fn aux(&self) -> Values<i32> {
        self.array.field(STATE)
    }

    pub fn set_color(&self, color: Color) {
        self.array.fill(COLOR, color.to_index());
    }

    /// Assigns one color per record, in view order.
    pub fn set_colors(&self, colors: &[Color]) -> Result<()> {
        let codes: Vec<i32> = colors.iter().map(|c| c.to_index()).collect();
        self.array.write(COLOR, &codes)
    }

    pub fn set_aux(&self, aux: i32) {
        self.array.fill(STATE, aux);
    }

    /// Copies every record out as `(type, color, aux)`.
    pub fn encode(&self) -> Values<[i32; OBJ_DIM]> {
        let records = self
            .array
            .to_vec()
            .chunks_exact(OBJ_DIM)
            .map(|c| [c[TYPE], c[COLOR], c[STATE]])
            .collect::<Vec<_>>();
        if self.is_scalar() {
            Values::Scalar(records[0])
        } else {
            Values::Batch(records)
        }
    }

    /// Overwrites every record with `record`.
    pub(crate) fn fill_record(&self, record: &[i32; OBJ_DIM]) -> Result<()> {
        self.array.fill_records(record)
    }

    /// An owned copy that no longer aliases this state's storage.
    pub fn copy(&self) -> Self {
        WorldObjState {
            array: self.array.copy(),
        }
    }

    pub fn shares_storage(&self, other: &WorldObjState) -> bool {
        self.array.shares_storage(&other.array)
    }

    fn record(&self) -> [i32; OBJ_DIM] {
        let r = self.array.record(0);
        [r[TYPE], r[COLOR], r[STATE]]
    }
}

impl fmt::Debug for WorldObjState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorldObjState{:?}", self.dims())
    }
}

/// Where a handle's record lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The handle owns a private record.
    Detached,
    /// The handle's record is a view into a grid cell.
    Attached { x: usize, y: usize },
}

#[derive(Debug)]
struct ObjInner {
    state: WorldObjState,
    placement: Placement,
}

/// Handle to a logical world object.
///
/// Cloning a handle shares identity; [`WorldObj::ptr_eq`] tells two handles
/// to the same object apart from equal-looking copies. The object's record
/// is either private or a view into the grid cell it was placed on.
#[derive(Clone)]
pub struct WorldObj {
    inner: Rc<RefCell<ObjInner>>,
}

impl WorldObj {
    /// Creates a detached object of `obj_type` in `color`.
    ///
    /// `Empty` and `Unseen` are not objects and are rejected.
    pub fn new(obj_type: ObjType, color: Color) -> Result<Self> {
        if matches!(obj_type, ObjType::Empty | ObjType::Unseen) {
            return Err(Error::invalid("type", obj_type));
        }
        Ok(Self::from_parts(WorldObjState::single(obj_type, color), Placement::Detached))
    }

    fn from_parts(state: WorldObjState, placement: Placement) -> Self {
        WorldObj {
            inner: Rc::new(RefCell::new(ObjInner { state, placement })),
        }
    }

    fn of_kind(obj_type: ObjType, color: Color) -> Self {
        Self::from_parts(WorldObjState::single(obj_type, color), Placement::Detached)
    }

    pub fn wall() -> Self {
        Self::of_kind(ObjType::Wall, ObjType::Wall.default_color())
    }

    pub fn floor(color: Color) -> Self {
        Self::of_kind(ObjType::Floor, color)
    }

    pub fn goal() -> Self {
        Self::of_kind(ObjType::Goal, ObjType::Goal.default_color())
    }

    pub fn lava() -> Self {
        Self::of_kind(ObjType::Lava, ObjType::Lava.default_color())
    }

    pub fn key(color: Color) -> Self {
        Self::of_kind(ObjType::Key, color)
    }

    pub fn ball(color: Color) -> Self {
        Self::of_kind(ObjType::Ball, color)
    }

    pub fn new_box(color: Color) -> Self {
        Self::of_kind(ObjType::Box, color)
    }

    pub fn door(color: Color, door_state: DoorState) -> Self {
        let door = Self::of_kind(ObjType::Door, color);
        door.set_aux(door_state.to_index());
        door
    }

    /// Wraps an existing scalar record without copying it.
    ///
    /// Returns `None` when the record holds no object.
    pub fn from_state(state: WorldObjState) -> Result<Option<Self>> {
        if !state.is_scalar() {
            return Err(Error::shape(1, state.len()));
        }
        Ok(match ObjType::from_index(state.record()[TYPE])? {
            ObjType::Empty | ObjType::Unseen => None,
            _ => Some(Self::from_parts(state, Placement::Detached)),
        })
    }

    /// Builds a detached object from its encoded triple.
    pub fn decode(type_idx: i32, color_idx: i32, aux: i32) -> Result<Option<Self>> {
        let obj_type = ObjType::from_index(type_idx)?;
        if matches!(obj_type, ObjType::Empty | ObjType::Unseen) {
            return Ok(None);
        }
        let obj = Self::of_kind(obj_type, Color::from_index(color_idx)?);
        obj.set_aux(aux);
        Ok(Some(obj))
    }

    /// Current record as `(type_index, color_index, aux)`.
    pub fn encode(&self) -> [i32; OBJ_DIM] {
        self.inner.borrow().state.record()
    }

    pub fn obj_type(&self) -> Result<ObjType> {
        ObjType::from_index(self.encode()[TYPE])
    }

    pub fn color(&self) -> Result<Color> {
        Color::from_index(self.encode()[COLOR])
    }

    pub fn set_color(&self, color: Color) {
        self.inner.borrow().state.set_color(color);
    }

    pub fn aux(&self) -> i32 {
        self.encode()[STATE]
    }

    pub fn set_aux(&self, aux: i32) {
        self.inner.borrow().state.set_aux(aux);
    }

    /// A view of this object's record.
    pub fn state(&self) -> WorldObjState {
        self.inner.borrow().state.clone()
    }

    pub fn placement(&self) -> Placement {
        self.inner.borrow().placement
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.placement(), Placement::Attached { .. })
    }

    /// Repoints this object's record at grid storage for cell `(x, y)`.
    pub(crate) fn attach(&self, state: WorldObjState, x: usize, y: usize) {
        let mut inner = self.inner.borrow_mut();
        inner.state = state;
        inner.placement = Placement::Attached { x, y };
    }

    /// Copies the record out so it no longer aliases grid storage.
    pub(crate) fn detach(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.state = inner.state.copy();
        inner.placement = Placement::Detached;
    }

    /// Whether both handles refer to the same logical object.
    pub fn ptr_eq(&self, other: &WorldObj) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn door_state(&self) -> Result<Option<DoorState>> {
        match self.obj_type()? {
            ObjType::Door => DoorState::from_index(self.aux()).map(Some),
            _ => Ok(None),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.door_state(), Ok(Some(DoorState::Open)))
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.door_state(), Ok(Some(DoorState::Locked)))
    }

    pub fn set_door_state(&self, door_state: DoorState) {
        self.set_aux(door_state.to_index());
    }

    pub fn can_overlap(&self) -> bool {
        match self.obj_type() {
            Ok(ObjType::Door) => self.is_open(),
            Ok(t) => t.can_overlap(),
            Err(_) => false,
        }
    }

    pub fn can_pickup(&self) -> bool {
        self.obj_type().is_ok_and(ObjType::can_pickup)
    }

    pub fn can_contain(&self) -> bool {
        self.obj_type().is_ok_and(ObjType::can_contain)
    }

    /// Whether light passes through this object.
    pub fn see_behind(&self) -> bool {
        match self.obj_type() {
            Ok(ObjType::Wall) => false,
            Ok(ObjType::Door) => self.is_open(),
            _ => true,
        }
    }

    /// Draws this object onto a tile image.
    pub fn render(&self, img: &mut Image) -> Result<()> {
        let c = self.color()?.rgb();
        let black = [0, 0, 0];
        match self.obj_type()? {
            ObjType::Goal | ObjType::Wall => {
                fill_coords(img, point_in_rect(0.0, 1.0, 0.0, 1.0), c);
            }
            ObjType::Floor => {
                fill_coords(img, point_in_rect(0.031, 1.0, 0.031, 1.0), c.map(|v| v / 2));
            }
            ObjType::Lava => {
                fill_coords(img, point_in_rect(0.0, 1.0, 0.0, 1.0), [255, 128, 0]);
                for i in 0..3 {
                    let ylo = 0.3 + 0.2 * i as f32;
                    let yhi = 0.4 + 0.2 * i as f32;
                    let r = 0.03;
                    fill_coords(img, point_in_line(0.1, ylo, 0.3, yhi, r), black);
                    fill_coords(img, point_in_line(0.3, yhi, 0.5, ylo, r), black);
                    fill_coords(img, point_in_line(0.5, ylo, 0.7, yhi, r), black);
                    fill_coords(img, point_in_line(0.7, yhi, 0.9, ylo, r), black);
                }
            }
            ObjType::Door => match DoorState::from_index(self.aux())? {
                DoorState::Open => {
                    fill_coords(img, point_in_rect(0.88, 1.0, 0.0, 1.0), c);
                    fill_coords(img, point_in_rect(0.92, 0.96, 0.04, 0.96), black);
                }
                DoorState::Locked => {
                    fill_coords(img, point_in_rect(0.0, 1.0, 0.0, 1.0), c);
                    let dim = c.map(|v| (v as f32 * 0.45) as u8);
                    fill_coords(img, point_in_rect(0.06, 0.94, 0.06, 0.94), dim);
                    // key slot
                    fill_coords(img, point_in_rect(0.52, 0.75, 0.50, 0.56), c);
                }
                DoorState::Closed => {
                    fill_coords(img, point_in_rect(0.0, 1.0, 0.0, 1.0), c);
                    fill_coords(img, point_in_rect(0.04, 0.96, 0.04, 0.96), black);
                    fill_coords(img, point_in_rect(0.08, 0.92, 0.08, 0.92), c);
                    fill_coords(img, point_in_rect(0.12, 0.88, 0.12, 0.88), black);
                    fill_coords(img, point_in_circle(0.75, 0.50, 0.08), c);
                }
            },
            ObjType::Key => {
                fill_coords(img, point_in_rect(0.50, 0.63, 0.31, 0.88), c);
                fill_coords(img, point_in_rect(0.38, 0.50, 0.59, 0.66), c);
                fill_coords(img, point_in_rect(0.38, 0.50, 0.81, 0.88), c);
                fill_coords(img, point_in_circle(0.56, 0.28, 0.190), c);
                fill_coords(img, point_in_circle(0.56, 0.28, 0.064), black);
            }
            ObjType::Ball => {
                fill_coords(img, point_in_circle(0.5, 0.5, 0.31), c);
            }
            ObjType::Box => {
                fill_coords(img, point_in_rect(0.12, 0.88, 0.12, 0.88), c);
                fill_coords(img, point_in_rect(0.18, 0.82, 0.18, 0.82), black);
                fill_coords(img, point_in_rect(0.16, 0.84, 0.47, 0.53), c);
            }
            ObjType::Agent => {
                // aux carries the facing of a decoded agent record
                render_agent_triangle(img, self.aux(), c);
            }
            ObjType::Empty | ObjType::Unseen => {}
        }
        Ok(())
    }
}

/// Draws the agent arrow, apex along direction code `dir`.
pub(crate) fn render_agent_triangle(img: &mut Image, dir: i32, color: [u8; 3]) {
    let tri = point_in_triangle((0.12, 0.19), (0.87, 0.50), (0.12, 0.81));
    let tri = rotate_fn(tri, 0.5, 0.5, FRAC_PI_2 * dir as f32);
    fill_coords(img, tri, color);
}

impl fmt::Debug for WorldObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldObj")
            .field("record", &self.encode())
            .field("placement", &self.placement())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_empty() {
        let state = WorldObjState::new(&[2, 3]);
        assert_eq!(state.len(), 6);
        assert_eq!(
            state.obj_type().unwrap(),
            Values::Batch(vec![ObjType::Empty; 6])
        );
        assert_eq!(state.aux(), Values::Batch(vec![0; 6]));
        assert_eq!(
            state.at(&[1, 2]).unwrap().encode(),
            Values::Scalar(EMPTY_RECORD)
        );
    }

    #[test]
    fn from_array_checks_record_width() {
        let cells = WorldObjState::from_array(StateArray::zeros(&[2], OBJ_DIM)).unwrap();
        assert_eq!(cells.aux(), Values::Batch(vec![0, 0]));
        assert_eq!(
            WorldObjState::from_array(StateArray::zeros(&[2], 4)).unwrap_err(),
            Error::ShapeMismatch { expected: 3, actual: 4 }
        );
    }

    #[test]
    fn constructors_use_default_colors() {
        assert_eq!(WorldObj::wall().encode(), [2, Color::Grey.to_index(), 0]);
        assert_eq!(WorldObj::goal().color(), Ok(Color::Green));
        assert_eq!(
            WorldObj::door(Color::Yellow, DoorState::Locked).encode(),
            [4, 4, 2]
        );
        assert!(WorldObj::new(ObjType::Empty, Color::Red).is_err());
    }

    #[test]
    fn decode_skips_empty_and_unseen() {
        assert!(WorldObj::decode(0, 0, 0).unwrap().is_none());
        assert!(WorldObj::decode(1, 0, 0).unwrap().is_none());
        let ball = WorldObj::decode(6, 3, 0).unwrap().unwrap();
        assert_eq!(ball.obj_type(), Ok(ObjType::Ball));
        assert_eq!(ball.color(), Ok(Color::Purple));
        assert!(WorldObj::decode(6, 99, 0).is_err());
    }

    #[test]
    fn from_state_aliases_record() {
        let grid = WorldObjState::new(&[3, 3]);
        grid.at(&[1, 1])
            .unwrap()
            .fill_record(&WorldObj::key(Color::Red).encode())
            .unwrap();
        let key = WorldObj::from_state(grid.at(&[1, 1]).unwrap())
            .unwrap()
            .unwrap();
        key.set_color(Color::Blue);
        assert_eq!(
            grid.at(&[1, 1]).unwrap().color().unwrap(),
            Values::Scalar(Color::Blue)
        );
        assert!(WorldObj::from_state(grid.at(&[0, 0]).unwrap()).unwrap().is_none());
        assert!(WorldObj::from_state(grid.clone()).is_err());
    }

    #[test]
    fn detach_copies_record_out() {
        let grid = WorldObjState::new(&[3, 3]);
        let ball = WorldObj::ball(Color::Green);
        let cell = grid.at(&[2, 0]).unwrap();
        cell.fill_record(&ball.encode()).unwrap();
        ball.attach(cell.clone(), 2, 0);
        assert_eq!(ball.placement(), Placement::Attached { x: 2, y: 0 });

        ball.detach();
        ball.set_color(Color::Red);
        assert_eq!(cell.color().unwrap(), Values::Scalar(Color::Green));
        assert!(!ball.is_attached());
    }

    #[test]
    fn door_affordances() {
        let door = WorldObj::door(Color::Blue, DoorState::Closed);
        assert!(!door.can_overlap());
        assert!(!door.see_behind());
        door.set_door_state(DoorState::Open);
        assert!(door.is_open());
        assert!(door.can_overlap());
        assert!(WorldObj::key(Color::Red).can_pickup());
        assert!(WorldObj::new_box(Color::Red).can_contain());
        assert!(!WorldObj::wall().can_overlap());
    }

    #[test]
    fn batch_color_assignment_checks_length() {
        let state = WorldObjState::new(&[3]);
        state.set_colors(&[Color::Red, Color::Blue, Color::Grey]).unwrap();
        assert_eq!(
            state.color().unwrap(),
            Values::Batch(vec![Color::Red, Color::Blue, Color::Grey])
        );
        assert_eq!(
            state.set_colors(&[Color::Red]),
            Err(Error::ShapeMismatch { expected: 3, actual: 1 })
        );
    }

    #[test]
    fn every_kind_renders() {
        for &t in &ObjType::ALL[2..] {
            let obj = WorldObj::new(t, Color::Purple).unwrap();
            let mut img = Image::new(12, 12);
            obj.render(&mut img).unwrap();
            assert!(img.as_raw().iter().any(|&v| v != 0), "{t} drew nothing");
        }
    }
}
