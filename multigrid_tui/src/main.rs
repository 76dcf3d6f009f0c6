use anyhow::{Context, Result, bail};
use clap::Parser;
use multigrid_core::{
    Agent, AgentConfig, AgentState, Color as CellColor, Direction as Facing, Entity, Grid, Mission,
    ObjType, Position,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    fs::File,
    io::{self, Stdout},
    path::PathBuf,
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Grid width, walls included
    #[arg(long, default_value_t = 8)]
    width: usize,

    /// Grid height, walls included
    #[arg(long, default_value_t = 8)]
    height: usize,

    /// Number of agents
    #[arg(short, long, default_value_t = 2)]
    agents: usize,

    /// Seed for agent placement and motion
    #[arg(short, long)]
    seed: Option<u64>,

    /// Milliseconds between simulation steps
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Write tracing output to this file (filtered by RUST_LOG)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

struct App {
    /// The shared world state.
    grid: Grid,
    /// Agents, each bound to one record of `_states`.
    agents: Vec<Agent>,
    _states: AgentState,
    rng: StdRng,
    /// Index of the agent that moves next.
    turn: usize,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(args: &Args) -> Result<Self> {
        let mut grid = Grid::new(args.width, args.height)?;
        grid.wall_rect(0, 0, args.width, args.height)?;

        let mut rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let states = AgentState::new(&[args.agents]);
        let mut agents = Vec::with_capacity(args.agents);
        for index in 0..args.agents {
            let agent = Agent::with_state(index, AgentConfig::default(), states.index(index)?)?;
            agent.reset(Mission::default());
            let pos = random_free_cell(&mut grid, &mut rng)?;
            agent.set_pos(Some(pos));
            agent.set_dir(Some(Facing::ALL[rng.random_range(0..Facing::ALL.len())]));
            grid.set(pos.x, pos.y, Some(agent.clone().into()))?;
            agents.push(agent);
        }
        info!(
            width = args.width,
            height = args.height,
            agents = args.agents,
            "world initialized"
        );

        Ok(App {
            grid,
            agents,
            _states: states,
            rng,
            turn: 0,
            should_quit: false,
        })
    }

    /// Lets the agent whose turn it is turn or step forward.
    fn tick(&mut self) -> Result<()> {
        let Some(agent) = self.agents.get(self.turn).cloned() else {
            return Ok(());
        };
        self.turn = (self.turn + 1) % self.agents.len();

        let (Some(pos), Some(dir)) = (agent.pos(), agent.dir()?) else {
            return Ok(());
        };
        match self.rng.random_range(0..3) {
            0 => agent.set_dir(Some(dir.turn_left())),
            1 => agent.set_dir(Some(dir.turn_right())),
            _ => {
                if let Some(front) = agent.front_pos() {
                    if self.is_walkable(front)? {
                        self.grid.set(pos.x, pos.y, None)?;
                        agent.set_pos(Some(front));
                        debug!(agent = agent.index(), x = front.x, y = front.y, "agent moved");
                    }
                }
            }
        }
        // refresh the cell projection with the new pose
        let pos = agent.pos().unwrap_or(pos);
        self.grid.set(pos.x, pos.y, Some(agent.into()))?;
        Ok(())
    }

    fn is_walkable(&mut self, pos: Position) -> Result<bool> {
        Ok(match self.grid.get(pos.x, pos.y)? {
            None => true,
            Some(Entity::Object(obj)) => obj.can_overlap(),
            Some(Entity::Agent(_)) => false,
        })
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn random_free_cell(grid: &mut Grid, rng: &mut StdRng) -> Result<Position> {
    let (w, h) = (grid.width() as i32, grid.height() as i32);
    for _ in 0..(w * h * 4) {
        let pos = Position::new(rng.random_range(1..w - 1), rng.random_range(1..h - 1));
        if grid.get(pos.x, pos.y)?.is_none() {
            return Ok(pos);
        }
    }
    bail!("no free cell for another agent in a {w}x{h} grid")
}

fn init_logging(path: &PathBuf) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(anyhow::Error::msg)
        .context("installing the log subscriber")
}

fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(path) = &args.log_file {
        init_logging(path)?;
    }
    if args.agents == 0 {
        bail!("at least one agent is required");
    }

    // Build the world before touching the terminal so errors print normally
    let mut app = App::new(&args)?;

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));
    restore_terminal(&mut terminal)?;
    result
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick()?;
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(70), // map
            Constraint::Percentage(20), // agents
            Constraint::Percentage(10), // help
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], &app.grid);
    render_agents(frame, main_layout[1], &app.agents);

    let help_text = Paragraph::new("Press 'q' or 'Esc' to quit.")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

fn term_color(color: Option<CellColor>) -> Color {
    match color {
        Some(CellColor::Red) => Color::Red,
        Some(CellColor::Green) => Color::Green,
        Some(CellColor::Blue) => Color::Blue,
        Some(CellColor::Purple) => Color::Magenta,
        Some(CellColor::Yellow) => Color::Yellow,
        Some(CellColor::Grey) | None => Color::DarkGray,
    }
}

/// Glyph for one encoded cell.
fn cell_span(record: [i32; 3]) -> Span<'static> {
    let [type_idx, color_idx, aux] = record;
    let style = Style::default().fg(term_color(CellColor::from_index(color_idx).ok()));
    let glyph = match ObjType::from_index(type_idx) {
        Ok(ObjType::Wall) => "#",
        Ok(ObjType::Floor) => ".",
        Ok(ObjType::Door) => match aux {
            0 => "/",
            _ => "+",
        },
        Ok(ObjType::Key) => "k",
        Ok(ObjType::Ball) => "o",
        Ok(ObjType::Box) => "b",
        Ok(ObjType::Goal) => "G",
        Ok(ObjType::Lava) => "~",
        Ok(ObjType::Agent) => match Facing::from_index(aux) {
            Ok(Facing::Right) => ">",
            Ok(Facing::Down) => "v",
            Ok(Facing::Left) => "<",
            Ok(Facing::Up) => "^",
            Err(_) => "@",
        },
        Ok(ObjType::Empty) | Ok(ObjType::Unseen) | Err(_) => " ",
    };
    match ObjType::from_index(type_idx) {
        Ok(ObjType::Agent) => Span::styled(glyph, style.bold()),
        _ => Span::styled(glyph, style),
    }
}

/// Renders the grid encoding onto the frame.
fn render_map(frame: &mut Frame, area: Rect, grid: &Grid) {
    let lines: Vec<Line> = match grid.encode(None) {
        Ok(encoding) => (0..grid.height())
            .map(|y| {
                (0..grid.width())
                    .map(|x| cell_span(encoding[(x, y)]))
                    .collect::<Vec<_>>()
                    .into()
            })
            .collect(),
        Err(err) => vec![Line::from(format!("cannot encode grid: {err}"))],
    };

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Multigrid").borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

/// Lists every agent's pose.
fn render_agents(frame: &mut Frame, area: Rect, agents: &[Agent]) {
    let items: Vec<ListItem> = agents
        .iter()
        .map(|agent| {
            let color = agent.color().ok();
            let pos = agent
                .pos()
                .map_or_else(|| "unplaced".to_string(), |p| format!("({}, {})", p.x, p.y));
            let dir = match agent.dir() {
                Ok(Some(dir)) => dir.to_string(),
                _ => "-".to_string(),
            };
            ListItem::from(Line::from(vec![
                Span::styled(
                    format!("Agent {}", agent.index()),
                    Style::default().fg(term_color(color)).bold(),
                ),
                Span::raw(format!(" Pos: {pos} Dir: {dir}")),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Agents"));
    frame.render_widget(list, area);
}
