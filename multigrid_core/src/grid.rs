use std::{collections::HashMap, fmt};

use tracing::{debug, trace};

use crate::{
    agent::Agent,
    constants::{Color, ObjType},
    error::{Error, Result},
    plane::{GridEncoding, Mask, Plane},
    rendering::Image,
    tile_cache::{SUBDIVISIONS, TileCache},
    world_object::{EMPTY_RECORD, OBJ_DIM, Placement, WorldObj, WorldObjState},
};

/// Smallest allowed grid side.
pub const MIN_SIZE: usize = 3;

/// Something that can occupy a grid cell.
#[derive(Debug, Clone)]
pub enum Entity {
    Object(WorldObj),
    Agent(Agent),
}

impl Entity {
    /// `(type_index, color_index, aux)` as stored in a cell record.
    pub fn encode(&self) -> [i32; OBJ_DIM] {
        match self {
            Entity::Object(obj) => obj.encode(),
            Entity::Agent(agent) => agent.encode(),
        }
    }

    pub fn render(&self, img: &mut Image) -> Result<()> {
        match self {
            Entity::Object(obj) => obj.render(img),
            Entity::Agent(agent) => agent.render(img),
        }
    }

    pub fn as_object(&self) -> Option<&WorldObj> {
        match self {
            Entity::Object(obj) => Some(obj),
            Entity::Agent(_) => None,
        }
    }

    pub fn as_agent(&self) -> Option<&Agent> {
        match self {
            Entity::Agent(agent) => Some(agent),
            Entity::Object(_) => None,
        }
    }

    /// Whether both values are handles to the same object or agent.
    pub fn ptr_eq(&self, other: &Entity) -> bool {
        match (self, other) {
            (Entity::Object(a), Entity::Object(b)) => a.ptr_eq(b),
            (Entity::Agent(a), Entity::Agent(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<WorldObj> for Entity {
    fn from(obj: WorldObj) -> Self {
        Entity::Object(obj)
    }
}

impl From<Agent> for Entity {
    fn from(agent: Agent) -> Self {
        Entity::Agent(agent)
    }
}

/// A `width × height` world of cell records.
///
/// Cell contents live in one [`WorldObjState`]. Handles returned by
/// [`Grid::get`] and objects placed with [`Grid::set`] are cached per cell
/// and alias the cell's record, so mutating such a handle mutates the grid.
/// Replacing the occupant of a cell detaches the previous handle.
pub struct Grid {
    state: WorldObjState,
    cache: HashMap<(usize, usize), Entity>,
}

impl Grid {
    /// Creates an empty grid. Both sides must be at least [`MIN_SIZE`].
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width < MIN_SIZE {
            return Err(Error::invalid("width", width));
        }
        if height < MIN_SIZE {
            return Err(Error::invalid("height", height));
        }
        Ok(Grid {
            state: WorldObjState::new(&[width, height]),
            cache: HashMap::new(),
        })
    }

    /// Wraps an existing `(width, height)` state without copying it.
    ///
    /// Both sides must be at least [`MIN_SIZE`], as for [`Grid::new`].
    pub fn from_state(state: WorldObjState) -> Result<Self> {
        let &[width, height] = state.dims() else {
            return Err(Error::shape(2, state.dims().len()));
        };
        if width < MIN_SIZE {
            return Err(Error::invalid("width", width));
        }
        if height < MIN_SIZE {
            return Err(Error::invalid("height", height));
        }
        Ok(Grid {
            state,
            cache: HashMap::new(),
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.state.dims()[0]
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.state.dims()[1]
    }

    /// The backing cell records.
    pub fn state(&self) -> &WorldObjState {
        &self.state
    }

    fn check_bounds(&self, x: i64, y: i64) -> Result<(usize, usize)> {
        let (width, height) = (self.width(), self.height());
        match (usize::try_from(x), usize::try_from(y)) {
            (Ok(col), Ok(row)) if col < width && row < height => Ok((col, row)),
            _ => Err(Error::OutOfBounds {
                x,
                y,
                width,
                height,
            }),
        }
    }

    /// Drops the cached occupant of a cell.
    ///
    /// An object is detached only if its record still views this cell; one
    /// that has since moved elsewhere keeps aliasing its new cell.
    fn evict(&mut self, x: usize, y: usize) {
        if let Some(Entity::Object(prev)) = self.cache.remove(&(x, y)) {
            if prev.placement() == (Placement::Attached { x, y }) {
                prev.detach();
                trace!(x, y, "detached previous occupant");
            }
        }
    }

    /// Forgets the cache entry of an object being moved off `(x, y)`.
    ///
    /// The old cell keeps its record; a later `get` materializes a new handle.
    fn forget_moved(&mut self, obj: &WorldObj, x: usize, y: usize) {
        let Placement::Attached { x: ox, y: oy } = obj.placement() else {
            return;
        };
        let cached_here = self
            .cache
            .get(&(ox, oy))
            .and_then(Entity::as_object)
            .is_some_and(|cached| cached.ptr_eq(obj));
        if (ox, oy) != (x, y) && cached_here {
            self.cache.remove(&(ox, oy));
            trace!(from_x = ox, from_y = oy, x, y, "object moved");
        }
    }

    /// Puts `value` in cell `(x, y)`, or clears the cell for `None`.
    ///
    /// A placed object's record is copied into the grid and the object is
    /// repointed at that cell. A placed agent is projected into the cell as
    /// `(agent, color, dir)`; the agent keeps its own state record.
    ///
    /// Placing an object that already sits on another cell of this grid
    /// moves it: the old cell's cache entry is dropped, its record is left
    /// as is.
    pub fn set(&mut self, x: i32, y: i32, value: Option<Entity>) -> Result<()> {
        let (x, y) = self.check_bounds(x.into(), y.into())?;
        let cell = self.state.at(&[x, y])?;
        self.evict(x, y);

        match value {
            None => cell.fill_record(&EMPTY_RECORD)?,
            Some(Entity::Object(obj)) => {
                self.forget_moved(&obj, x, y);
                cell.fill_record(&obj.encode())?;
                obj.attach(cell, x, y);
                self.cache.insert((x, y), Entity::Object(obj));
            }
            Some(Entity::Agent(agent)) => {
                cell.fill_record(&agent.encode())?;
                self.cache.insert((x, y), Entity::Agent(agent));
            }
        }
        trace!(x, y, "cell set");
        Ok(())
    }

    /// Returns the occupant of cell `(x, y)`, or `None` if it is empty.
    ///
    /// Cells that were never fetched or placed are materialized from their
    /// record into a handle that aliases the cell.
    pub fn get(&mut self, x: i32, y: i32) -> Result<Option<Entity>> {
        let (x, y) = self.check_bounds(x.into(), y.into())?;
        if let Some(entity) = self.cache.get(&(x, y)) {
            return Ok(Some(entity.clone()));
        }

        let cell = self.state.at(&[x, y])?;
        let Some(obj) = WorldObj::from_state(cell.clone())? else {
            return Ok(None);
        };
        obj.attach(cell, x, y);
        let entity = Entity::Object(obj);
        self.cache.insert((x, y), entity.clone());
        Ok(Some(entity))
    }

    /// Fills a horizontal run of cells with copies of `template`.
    ///
    /// The run starts at `(x, y)` and covers `length` cells, or up to the
    /// right edge when `length` is `None`. Runs past the edge are clipped.
    pub fn horz_run(
        &mut self,
        x: i32,
        y: i32,
        length: Option<usize>,
        template: &WorldObj,
    ) -> Result<()> {
        let (x, y) = self.check_bounds(x.into(), y.into())?;
        let end = length.map_or(self.width(), |len| x.saturating_add(len).min(self.width()));
        self.fill_cells((x..end).map(|i| (i, y)), template.encode())
    }

    /// Fills a vertical run of cells with copies of `template`.
    pub fn vert_run(
        &mut self,
        x: i32,
        y: i32,
        length: Option<usize>,
        template: &WorldObj,
    ) -> Result<()> {
        let (x, y) = self.check_bounds(x.into(), y.into())?;
        let end = length.map_or(self.height(), |len| y.saturating_add(len).min(self.height()));
        self.fill_cells((y..end).map(|j| (x, j)), template.encode())
    }

    fn fill_cells(
        &mut self,
        cells: impl IntoIterator<Item = (usize, usize)>,
        record: [i32; OBJ_DIM],
    ) -> Result<()> {
        for (x, y) in cells {
            self.evict(x, y);
            self.state.at(&[x, y])?.fill_record(&record)?;
        }
        Ok(())
    }

    pub fn horz_wall(&mut self, x: i32, y: i32, length: Option<usize>) -> Result<()> {
        self.horz_run(x, y, length, &WorldObj::wall())
    }

    pub fn vert_wall(&mut self, x: i32, y: i32, length: Option<usize>) -> Result<()> {
        self.vert_run(x, y, length, &WorldObj::wall())
    }

    /// Walls in the `w × h` rectangle whose top-left corner is `(x, y)`.
    ///
    /// Both corners must lie on the grid; nothing is written otherwise.
    /// A rectangle with a zero side is a no-op.
    pub fn wall_rect(&mut self, x: i32, y: i32, w: usize, h: usize) -> Result<()> {
        if w == 0 || h == 0 {
            return Ok(());
        }
        let far = |start: i32, len: usize| {
            i64::from(start).saturating_add(i64::try_from(len - 1).unwrap_or(i64::MAX))
        };
        let (left, top) = self.check_bounds(x.into(), y.into())?;
        let (right, bottom) = self.check_bounds(far(x, w), far(y, h))?;
        let record = WorldObj::wall().encode();
        self.fill_cells((left..=right).flat_map(|i| [(i, top), (i, bottom)]), record)?;
        self.fill_cells((top..=bottom).flat_map(|j| [(left, j), (right, j)]), record)
    }

    /// Whether any cell holds an `obj_type`, optionally of `color`.
    pub fn contains_type(&self, obj_type: ObjType, color: Option<Color>) -> bool {
        let wanted_color = color.map(Color::to_index);
        self.records().iter().any(|r| {
            r[0] == obj_type.to_index() && wanted_color.is_none_or(|c| r[1] == c)
        })
    }

    /// Occupants of every cell, x-major.
    pub fn entities(&mut self) -> Result<Vec<Option<Entity>>> {
        let mut out = Vec::with_capacity(self.width() * self.height());
        for x in 0..self.width() as i32 {
            for y in 0..self.height() as i32 {
                out.push(self.get(x, y)?);
            }
        }
        Ok(out)
    }

    fn records(&self) -> Vec<[i32; OBJ_DIM]> {
        self.state.encode().into_vec()
    }

    fn check_mask(&self, mask: &Mask) -> Result<()> {
        let (w, h) = (self.width(), self.height());
        if (mask.width(), mask.height()) != (w, h) {
            return Err(Error::shape(w * h, mask.width() * mask.height()));
        }
        Ok(())
    }

    /// Encodes the grid as `(type_index, color_index, aux)` per cell.
    ///
    /// Cells hidden by `vis_mask` encode as `(0, 0, 0)`, the "unseen" type.
    pub fn encode(&self, vis_mask: Option<&Mask>) -> Result<GridEncoding> {
        if let Some(mask) = vis_mask {
            self.check_mask(mask)?;
        }
        let records = self.records();
        let height = self.height();
        Ok(Plane::from_generator(self.width(), height, |x, y| {
            match vis_mask {
                Some(mask) if !mask[(x, y)] => [0; OBJ_DIM],
                _ => records[x * height + y],
            }
        }))
    }

    /// Rebuilds a grid from an encoding.
    ///
    /// Also returns which cells were visible, i.e. not of the "unseen" type.
    pub fn decode(encoding: &GridEncoding) -> Result<(Grid, Mask)> {
        let (width, height) = (encoding.width(), encoding.height());
        let mut grid = Grid::new(width, height)?;
        let mut vis_mask = Mask::filled(width, height, true);
        for ((x, y), &[type_idx, color_idx, aux]) in encoding.enumerate() {
            let obj = WorldObj::decode(type_idx, color_idx, aux)?;
            grid.set(x as i32, y as i32, obj.map(Entity::Object))?;
            vis_mask[(x, y)] = type_idx != ObjType::Unseen.to_index();
        }
        debug!(width, height, "decoded grid");
        Ok((grid, vis_mask))
    }

    /// Renders the grid at `tile_size` pixels per cell through the global tile cache.
    pub fn render(&mut self, tile_size: usize, highlight_mask: Option<&Mask>) -> Result<Image> {
        self.render_with(TileCache::global(), tile_size, highlight_mask)
    }

    pub fn render_with(
        &mut self,
        cache: &TileCache,
        tile_size: usize,
        highlight_mask: Option<&Mask>,
    ) -> Result<Image> {
        if let Some(mask) = highlight_mask {
            self.check_mask(mask)?;
        }
        let (width, height) = (self.width(), self.height());
        let mut img = Image::new(width * tile_size, height * tile_size);

        for y in 0..height {
            for x in 0..width {
                let cell = self.get(x as i32, y as i32)?;
                let highlight = highlight_mask.is_some_and(|mask| mask[(x, y)]);
                let tile = cache.render_tile(cell.as_ref(), highlight, tile_size, SUBDIVISIONS)?;
                img.blit(&tile, x * tile_size, y * tile_size);
            }
        }
        Ok(img)
    }
}

/// Deep copy with fresh storage; cached handles are not carried over.
impl Clone for Grid {
    fn clone(&self) -> Self {
        Grid {
            state: self.state.copy(),
            cache: HashMap::new(),
        }
    }
}

/// Grids are equal when their cell records are.
impl PartialEq for Grid {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
    }
}

impl Eq for Grid {}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Position,
        agent::AgentConfig,
        constants::{Direction, DoorState},
    };

    fn object(entity: Option<Entity>) -> WorldObj {
        match entity {
            Some(Entity::Object(obj)) => obj,
            other => panic!("expected an object, got {other:?}"),
        }
    }

    #[test]
    fn new_grid_is_empty() {
        let mut grid = Grid::new(4, 5).unwrap();
        assert_eq!((grid.width(), grid.height()), (4, 5));
        assert!(grid.get(3, 4).unwrap().is_none());
        assert!(grid.contains_type(ObjType::Empty, None));
        assert!(matches!(
            Grid::new(2, 5),
            Err(Error::InvalidFieldValue { field: "width", .. })
        ));
    }

    #[test]
    fn set_then_get_returns_same_handle() {
        let mut grid = Grid::new(5, 5).unwrap();
        let ball = WorldObj::ball(Color::Purple);
        grid.set(2, 3, Some(ball.clone().into())).unwrap();

        let got = object(grid.get(2, 3).unwrap());
        assert!(got.ptr_eq(&ball));
        assert_eq!(got.encode(), ball.encode());
        assert_eq!(ball.placement(), crate::world_object::Placement::Attached { x: 2, y: 3 });
    }

    #[test]
    fn placed_object_aliases_cell() {
        let mut grid = Grid::new(5, 5).unwrap();
        let door = WorldObj::door(Color::Red, DoorState::Locked);
        grid.set(1, 1, Some(door.clone().into())).unwrap();

        door.set_door_state(DoorState::Open);
        assert_eq!(grid.encode(None).unwrap()[(1, 1)], [4, 0, 0]);
    }

    #[test]
    fn materialized_handle_aliases_cell() {
        let mut grid = Grid::new(5, 5).unwrap();
        grid.horz_wall(0, 0, None).unwrap();
        let wall = object(grid.get(2, 0).unwrap());
        wall.set_color(Color::Blue);

        let again = object(grid.get(2, 0).unwrap());
        assert!(again.ptr_eq(&wall));
        assert_eq!(grid.encode(None).unwrap()[(2, 0)], [2, 2, 0]);
    }

    #[test]
    fn clearing_detaches_previous_handle() {
        let mut grid = Grid::new(5, 5).unwrap();
        let key = WorldObj::key(Color::Yellow);
        grid.set(3, 3, Some(key.clone().into())).unwrap();
        let fetched = object(grid.get(3, 3).unwrap());

        grid.set(3, 3, None).unwrap();
        fetched.set_color(Color::Green);
        assert!(!key.is_attached());
        assert!(grid.get(3, 3).unwrap().is_none());
        assert_eq!(grid.encode(None).unwrap()[(3, 3)], EMPTY_RECORD);
        assert_eq!(key.color(), Ok(Color::Green));
    }

    #[test]
    fn moved_object_keeps_aliasing_new_cell() {
        let mut grid = Grid::new(5, 5).unwrap();
        let ball = WorldObj::ball(Color::Red);
        grid.set(1, 1, Some(ball.clone().into())).unwrap();
        grid.set(2, 2, Some(ball.clone().into())).unwrap();
        grid.set(1, 1, None).unwrap();

        assert_eq!(ball.placement(), crate::world_object::Placement::Attached { x: 2, y: 2 });
        ball.set_color(Color::Blue);
        assert_eq!(ball.encode(), [6, 2, 0]);
        assert_eq!(grid.encode(None).unwrap()[(2, 2)], [6, 2, 0]);
        assert_eq!(grid.encode(None).unwrap()[(1, 1)], EMPTY_RECORD);
        assert!(object(grid.get(2, 2).unwrap()).ptr_eq(&ball));
    }

    #[test]
    fn moving_leaves_old_record_as_fresh_handle() {
        let mut grid = Grid::new(5, 5).unwrap();
        let key = WorldObj::key(Color::Grey);
        grid.set(0, 0, Some(key.clone().into())).unwrap();
        grid.set(4, 4, Some(key.clone().into())).unwrap();

        let left_behind = object(grid.get(0, 0).unwrap());
        assert!(!left_behind.ptr_eq(&key));
        left_behind.set_color(Color::Purple);
        assert_eq!(key.color(), Ok(Color::Grey));
        assert_eq!(grid.encode(None).unwrap()[(4, 4)], key.encode());
    }

    #[test]
    fn out_of_bounds_leaves_grid_untouched() {
        let mut grid = Grid::new(4, 4).unwrap();
        let before = grid.clone();
        for (x, y) in [(-1, 0), (4, 0), (0, -1), (0, 4)] {
            let err = grid.set(x, y, Some(WorldObj::wall().into())).unwrap_err();
            assert!(matches!(err, Error::OutOfBounds { width: 4, height: 4, .. }));
            assert!(grid.get(x, y).is_err());
        }
        assert_eq!(grid, before);
    }

    #[test]
    fn agent_cell_is_a_projection() {
        let mut grid = Grid::new(6, 6).unwrap();
        let agent = Agent::new(0, AgentConfig::default()).unwrap();
        agent.set_color(Color::Blue);
        agent.set_dir(Some(Direction::Down));
        agent.set_pos(Some(Position { x: 2, y: 2 }));
        grid.set(2, 2, Some(agent.clone().into())).unwrap();

        assert_eq!(grid.encode(None).unwrap()[(2, 2)], [10, 2, 1]);
        let got = grid.get(2, 2).unwrap().unwrap();
        assert!(got.as_agent().is_some_and(|a| a.ptr_eq(&agent)));

        // the agent keeps its own record
        agent.set_dir(Some(Direction::Up));
        assert_eq!(grid.encode(None).unwrap()[(2, 2)], [10, 2, 1]);
    }

    #[test]
    fn walls_clip_and_evict() {
        let mut grid = Grid::new(5, 4).unwrap();
        let ball = WorldObj::ball(Color::Red);
        grid.set(3, 1, Some(ball.clone().into())).unwrap();

        grid.horz_wall(2, 1, Some(10)).unwrap();
        assert!(!ball.is_attached());
        let row: Vec<i32> = (0..5).map(|x| grid.encode(None).unwrap()[(x, 1)][0]).collect();
        assert_eq!(row, vec![1, 1, 2, 2, 2]);
        assert_eq!(object(grid.get(3, 1).unwrap()).obj_type(), Ok(ObjType::Wall));

        grid.vert_wall(0, 1, None).unwrap();
        assert_eq!(grid.encode(None).unwrap()[(0, 3)][0], 2);
        assert_eq!(grid.encode(None).unwrap()[(0, 0)][0], 1);
        assert!(grid.horz_wall(0, 4, None).is_err());
    }

    #[test]
    fn unbounded_run_lengths_clip_at_edge() {
        let mut grid = Grid::new(5, 4).unwrap();
        grid.horz_wall(1, 0, Some(usize::MAX)).unwrap();
        grid.vert_wall(0, 1, Some(usize::MAX)).unwrap();
        let enc = grid.encode(None).unwrap();
        assert_eq!((1..5).map(|x| enc[(x, 0)][0]).collect::<Vec<_>>(), vec![2; 4]);
        assert_eq!((1..4).map(|y| enc[(0, y)][0]).collect::<Vec<_>>(), vec![2; 3]);
        assert_eq!(enc[(0, 0)][0], 1);
    }

    #[test]
    fn wall_rect_rejects_rects_past_the_edge() {
        let mut grid = Grid::new(5, 4).unwrap();
        let before = grid.clone();
        assert!(matches!(
            grid.wall_rect(1, 1, usize::MAX, 2),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(grid.wall_rect(0, 0, 5, 5).is_err());
        assert_eq!(grid, before);

        grid.wall_rect(1, 1, 0, 3).unwrap();
        assert_eq!(grid, before);
        grid.wall_rect(1, 1, 1, 1).unwrap();
        assert_eq!(grid.encode(None).unwrap()[(1, 1)][0], 2);
    }

    #[test]
    fn from_state_rejects_small_grids() {
        assert!(matches!(
            Grid::from_state(WorldObjState::new(&[0, 0])),
            Err(Error::InvalidFieldValue { field: "width", .. })
        ));
        assert!(matches!(
            Grid::from_state(WorldObjState::new(&[3, 2])),
            Err(Error::InvalidFieldValue { field: "height", .. })
        ));
    }

    #[test]
    fn wall_rect_outlines_grid() {
        let mut grid = Grid::new(5, 4).unwrap();
        grid.wall_rect(0, 0, 5, 4).unwrap();
        let enc = grid.encode(None).unwrap();
        for ((x, y), record) in enc.enumerate() {
            let border = x == 0 || y == 0 || x == 4 || y == 3;
            assert_eq!(record[0] == 2, border, "cell ({x}, {y})");
        }
    }

    #[test]
    fn encode_masks_hidden_cells() {
        let mut grid = Grid::new(3, 3).unwrap();
        grid.set(1, 1, Some(WorldObj::goal().into())).unwrap();
        let mut mask = Mask::filled(3, 3, true);
        mask[(1, 1)] = false;

        let enc = grid.encode(Some(&mask)).unwrap();
        assert_eq!(enc[(1, 1)], [0, 0, 0]);
        assert_eq!(enc[(0, 0)], EMPTY_RECORD);

        let (decoded, vis) = Grid::decode(&enc).unwrap();
        assert!(!vis[(1, 1)]);
        assert!(vis[(0, 1)]);
        assert!(!decoded.contains_type(ObjType::Goal, None));

        assert!(grid.encode(Some(&Mask::filled(4, 3, true))).is_err());
    }

    #[test]
    fn decode_round_trips() {
        let mut grid = Grid::new(6, 5).unwrap();
        grid.wall_rect(0, 0, 6, 5).unwrap();
        grid.set(1, 2, Some(WorldObj::door(Color::Blue, DoorState::Locked).into())).unwrap();
        grid.set(3, 3, Some(WorldObj::lava().into())).unwrap();
        grid.set(4, 1, Some(WorldObj::key(Color::Grey).into())).unwrap();

        let (decoded, vis) = Grid::decode(&grid.encode(None).unwrap()).unwrap();
        assert_eq!(decoded, grid);
        assert!(vis.iter().all(|&v| v));
    }

    #[test]
    fn contains_type_filters_by_color() {
        let mut grid = Grid::new(3, 3).unwrap();
        grid.set(0, 0, Some(WorldObj::key(Color::Red).into())).unwrap();
        assert!(grid.contains_type(ObjType::Key, Some(Color::Red)));
        assert!(grid.contains_type(ObjType::Key, None));
        assert!(!grid.contains_type(ObjType::Key, Some(Color::Blue)));
    }

    #[test]
    fn clone_is_deep() {
        let mut grid = Grid::new(3, 3).unwrap();
        let ball = WorldObj::ball(Color::Red);
        grid.set(1, 1, Some(ball.clone().into())).unwrap();
        let copy = grid.clone();
        ball.set_color(Color::Blue);
        assert_ne!(copy, grid);
        assert!(copy.contains_type(ObjType::Ball, Some(Color::Red)));
    }

    #[test]
    fn from_state_shares_storage() {
        let state = WorldObjState::new(&[3, 4]);
        let mut grid = Grid::from_state(state.clone()).unwrap();
        grid.set(0, 3, Some(WorldObj::goal().into())).unwrap();
        assert_eq!(
            state.at(&[0, 3]).unwrap().encode().scalar(),
            Some(WorldObj::goal().encode())
        );
        assert!(Grid::from_state(WorldObjState::new(&[3])).is_err());
    }

    #[test]
    fn render_tiles_in_row_major_order() {
        let cache = TileCache::new();
        let mut grid = Grid::new(3, 4).unwrap();
        grid.set(2, 0, Some(WorldObj::goal().into())).unwrap();
        let mut highlight = Mask::filled(3, 4, false);
        highlight[(0, 3)] = true;

        let img = grid.render_with(&cache, 4, Some(&highlight)).unwrap();
        assert_eq!((img.width(), img.height()), (12, 16));
        assert_eq!(img.pixel(10, 2), Color::Green.rgb());
        assert_ne!(img.pixel(2, 14), [0, 0, 0]);
        assert_eq!(img.pixel(6, 6), [0, 0, 0]);
        // empty, highlighted empty, goal
        assert_eq!(cache.len(), 3);
    }
}
