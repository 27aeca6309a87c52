//! A* Router
//!
//! Labels every pin and connects the pins of low fan-out nets with
//! orthogonal wires. Each wired pin gets a short stub pointing away from its
//! body; stub ends are joined by a spanning tree whose edges are found with
//! an A* search on a routing grid. The search avoids part bodies, never
//! touches another wire's end or bend, and crosses other wires only at right
//! angles. When the search fails within its budget the edge is drawn as a
//! direct L or Z shaped path that touches no other net where one exists, and
//! reported as a fallback.

use crate::labels::NetLabel;
use crate::layout::Layout;
use schemgen_eda::ElectricalType;
use schemgen_netlist::geometry::{Point, Rect};
use schemgen_netlist::{Diagnostics, PinLabel, PinModel, PinRef, Warning};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet};

/// Router configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Nets with more members than this get labels only
    pub fanout_limit: usize,
    /// Length of the stub drawn outward from each wired pin
    pub stub_length: f64,
    /// Routing grid resolution (mm per cell)
    pub grid: f64,
    /// Keep wires this far from part bodies
    pub clearance: f64,
    /// Extra cost of a bend, in cells
    pub bend_penalty: u32,
    /// Node expansions allowed per connection before falling back
    pub expansion_budget: usize,
    /// Cells the search may stray outside the box spanned by its endpoints
    pub search_margin: i32,
    /// Draw a short wire from each label-only pin to its label. Without it
    /// those labels sit off the pin and KiCad leaves them dangling.
    pub label_leads: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fanout_limit: 3,
            stub_length: 3.81,
            grid: 1.27,
            clearance: 2.54,
            bend_penalty: 2,
            expansion_budget: 20_000,
            search_margin: 20,
            label_leads: true,
        }
    }
}

/// A straight wire segment belonging to one net.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wire {
    pub net: String,
    pub start: Point,
    pub end: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoConnectFlag {
    pub pin: PinRef,
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Shared labels carry the connection.
    HighFanout { members: usize },
    SingleMember,
}

/// Result of connecting one pair of pins.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoutingOutcome {
    Routed {
        from: PinRef,
        to: PinRef,
        path: Vec<Point>,
    },
    /// No clean path within the budget; `path` may cross parts, and touches
    /// another net only when every direct shape does.
    Fallback {
        from: PinRef,
        to: PinRef,
        path: Vec<Point>,
    },
    Skipped(SkipReason),
}

impl RoutingOutcome {
    pub fn path(&self) -> Option<&[Point]> {
        match self {
            RoutingOutcome::Routed { path, .. } | RoutingOutcome::Fallback { path, .. } => {
                Some(path)
            }
            RoutingOutcome::Skipped(_) => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, RoutingOutcome::Fallback { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetRoute {
    pub net: String,
    pub outcomes: Vec<RoutingOutcome>,
}

/// Everything the router adds to the sheet.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Routing {
    pub nets: Vec<NetRoute>,
    /// Stubs and routed paths of wired nets.
    pub wires: Vec<Wire>,
    /// Pin-to-label leads of label-only pins, unless `label_leads` is off.
    pub leads: Vec<Wire>,
    pub junctions: Vec<Point>,
    pub labels: Vec<NetLabel>,
    pub no_connects: Vec<NoConnectFlag>,
}

impl Routing {
    pub fn net(&self, name: &str) -> Option<&NetRoute> {
        self.nets.iter().find(|n| n.net == name)
    }

    pub fn wires_of<'a>(&'a self, net: &'a str) -> impl Iterator<Item = &'a Wire> + 'a {
        self.wires.iter().filter(move |w| w.net == net)
    }

    pub fn labels_of<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a NetLabel> + 'a {
        self.labels.iter().filter(move |l| l.text == text)
    }

    /// Fallback paths with their net names.
    pub fn fallbacks(&self) -> impl Iterator<Item = (&str, &[Point])> {
        self.nets.iter().flat_map(|n| {
            n.outcomes
                .iter()
                .filter(|o| o.is_fallback())
                .filter_map(move |o| Some((n.net.as_str(), o.path()?)))
        })
    }
}

/// Label every pin and wire the low fan-out nets of a placed layout.
pub fn route(
    layout: &Layout,
    model: &PinModel,
    config: &RouterConfig,
    diagnostics: &mut Diagnostics,
) -> Routing {
    AStarRouter::new(layout, model, config.clone()).route(diagnostics)
}

/// Grid cell coordinates, Y grows downward like the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    fn step(self, heading: Heading) -> GridCell {
        let (dx, dy) = heading.delta();
        GridCell {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    fn manhattan(self, other: GridCell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Heading {
    East,
    West,
    North,
    South,
}

impl Heading {
    const ALL: [Heading; 4] = [Heading::East, Heading::West, Heading::North, Heading::South];

    fn delta(self) -> (i32, i32) {
        match self {
            Heading::East => (1, 0),
            Heading::West => (-1, 0),
            Heading::North => (0, -1),
            Heading::South => (0, 1),
        }
    }

    fn opposite(self) -> Heading {
        match self {
            Heading::East => Heading::West,
            Heading::West => Heading::East,
            Heading::North => Heading::South,
            Heading::South => Heading::North,
        }
    }

    fn is_horizontal(self) -> bool {
        matches!(self, Heading::East | Heading::West)
    }
}

/// What a wire leaves in a grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Occupant {
    /// A straight run passing through.
    Run { horizontal: bool },
    /// An end point or a bend.
    Vertex,
}

type State = (GridCell, Option<Heading>);

/// A node in the A* search
#[derive(Debug, Clone, PartialEq, Eq)]
struct AStarNode {
    cell: GridCell,
    heading: Option<Heading>,
    g_cost: u32,
    h_cost: u32,
}

impl AStarNode {
    fn f_cost(&self) -> u32 {
        self.g_cost + self.h_cost
    }
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; the remaining keys only make ties
        // deterministic.
        other
            .f_cost()
            .cmp(&self.f_cost())
            .then_with(|| other.h_cost.cmp(&self.h_cost))
            .then_with(|| other.cell.cmp(&self.cell))
            .then_with(|| other.heading.cmp(&self.heading))
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One labeled pin on the sheet.
struct SheetPin {
    pin: PinRef,
    position: Point,
    label: NetLabel,
}

/// A* Router
pub struct AStarRouter<'a> {
    layout: &'a Layout,
    model: &'a PinModel,
    config: RouterConfig,
    obstacles: HashSet<GridCell>,
    occupancy: HashMap<GridCell, Vec<Occupant>>,
}

impl<'a> AStarRouter<'a> {
    pub fn new(layout: &'a Layout, model: &'a PinModel, config: RouterConfig) -> Self {
        let mut router = Self {
            layout,
            model,
            config,
            obstacles: HashSet::new(),
            occupancy: HashMap::new(),
        };
        router.initialize_obstacles();
        router
    }

    /// Every cell within `clearance` of a part body.
    fn initialize_obstacles(&mut self) {
        let g = self.config.grid;
        for inst in &self.layout.instances {
            let rect = inst.body_rect().inflate(self.config.clearance);
            let x_start = (rect.min.x / g - 1e-6).ceil() as i32;
            let x_end = (rect.max.x / g + 1e-6).floor() as i32;
            let y_start = (rect.min.y / g - 1e-6).ceil() as i32;
            let y_end = (rect.max.y / g + 1e-6).floor() as i32;
            for x in x_start..=x_end {
                for y in y_start..=y_end {
                    self.obstacles.insert(GridCell { x, y });
                }
            }
        }
    }

    pub fn route(mut self, diagnostics: &mut Diagnostics) -> Routing {
        let (layout, model) = (self.layout, self.model);
        let mut routing = Routing::default();
        let mut wired_pins: BTreeMap<&str, Vec<SheetPin>> = BTreeMap::new();

        for inst in &layout.instances {
            for pin in inst.pins() {
                let pin_ref = PinRef::new(&inst.designator, &pin.number);
                let position = inst.pin_position(pin).canonical();
                let label = model.label(&pin_ref);

                let flagged = match label {
                    Some(PinLabel::NoConnect { .. }) => true,
                    Some(PinLabel::Unconnected { .. }) | None => {
                        pin.electrical_type == ElectricalType::NoConnect
                    }
                    Some(PinLabel::Net { .. }) => false,
                };
                if flagged {
                    self.mark_segment(position, position);
                    routing.no_connects.push(NoConnectFlag {
                        pin: pin_ref,
                        position,
                    });
                    continue;
                }

                let text = label
                    .map(|l| l.text().to_string())
                    .unwrap_or_else(|| format!("{}_{}", inst.designator, pin.number));
                let sheet_label =
                    NetLabel::at_pin(text, pin_ref.clone(), position, inst.pin_rotation(pin));
                routing.labels.push(sheet_label.clone());

                match label {
                    Some(PinLabel::Net { name }) if self.is_wired(name) => {
                        wired_pins.entry(name.as_str()).or_default().push(SheetPin {
                            pin: pin_ref,
                            position,
                            label: sheet_label,
                        });
                    }
                    _ if self.config.label_leads => {
                        self.mark_segment(position, sheet_label.position);
                        routing.leads.push(Wire {
                            net: sheet_label.text.clone(),
                            start: position,
                            end: sheet_label.position,
                        });
                    }
                    _ => self.mark_segment(position, position),
                }
            }
        }

        // Stubs go in before any path so no path can run over one.
        let mut stub_ends: BTreeMap<&str, Vec<Point>> = BTreeMap::new();
        for (net, pins) in &wired_pins {
            for sheet_pin in pins {
                let (dx, dy) = sheet_pin.label.pin_rotation.outward();
                let end = sheet_pin
                    .position
                    .offset(dx * self.config.stub_length, dy * self.config.stub_length)
                    .canonical();
                self.mark_segment(sheet_pin.position, end);
                routing.wires.push(Wire {
                    net: net.to_string(),
                    start: sheet_pin.position,
                    end,
                });
                stub_ends.entry(*net).or_default().push(end);
            }
        }

        for (net, members) in model.nets() {
            let skipped = if members.len() < 2 {
                Some(SkipReason::SingleMember)
            } else if members.len() > self.config.fanout_limit {
                Some(SkipReason::HighFanout {
                    members: members.len(),
                })
            } else {
                None
            };
            if let Some(reason) = skipped {
                log::debug!("net {net}: {reason:?}, labels only");
                routing.nets.push(NetRoute {
                    net: net.to_string(),
                    outcomes: vec![RoutingOutcome::Skipped(reason)],
                });
                continue;
            }

            let pins = wired_pins.get(net).map(Vec::as_slice).unwrap_or(&[]);
            let ends = stub_ends.get(net).map(Vec::as_slice).unwrap_or(&[]);
            let outcomes = self.route_net(net, pins, ends, &mut routing, diagnostics);
            routing.nets.push(NetRoute {
                net: net.to_string(),
                outcomes,
            });
        }

        let connections = routing
            .nets
            .iter()
            .flat_map(|n| &n.outcomes)
            .filter(|o| o.path().is_some())
            .count();
        log::info!(
            "routed {} wires over {} connections ({} fallbacks), placed {} labels and {} no-connect flags",
            routing.wires.len(),
            connections,
            routing.fallbacks().count(),
            routing.labels.len(),
            routing.no_connects.len()
        );
        routing
    }

    fn is_wired(&self, net: &str) -> bool {
        let members = self.model.fan_out(net);
        members >= 2 && members <= self.config.fanout_limit
    }

    /// Connect the stub ends of one net along a spanning tree.
    fn route_net(
        &mut self,
        net: &str,
        pins: &[SheetPin],
        ends: &[Point],
        routing: &mut Routing,
        diagnostics: &mut Diagnostics,
    ) -> Vec<RoutingOutcome> {
        let mut outcomes = Vec::new();
        for (a, b) in spanning_tree(ends) {
            let (start, goal) = (ends[a], ends[b]);
            let (from, to) = (pins[a].pin.clone(), pins[b].pin.clone());

            let outcome = match self.find_path(self.point_to_grid(start), self.point_to_grid(goal)) {
                Some(cells) => {
                    let mut path: Vec<Point> =
                        corners(&cells).into_iter().map(|c| self.grid_to_point(c)).collect();
                    if let Some(first) = path.first_mut() {
                        *first = start;
                    }
                    if let Some(last) = path.last_mut() {
                        *last = goal;
                    }
                    self.mark_path(&path);
                    RoutingOutcome::Routed { from, to, path }
                }
                None => {
                    let (path, touches) = self.fallback_path(net, start, goal, routing);
                    if !touches.is_empty() {
                        log::warn!("net {net}: fallback {from} -> {to} touches {touches:?}");
                    }
                    diagnostics.warn(Warning::RoutingFallback {
                        net: net.to_string(),
                        from: from.to_string(),
                        to: to.to_string(),
                        touches,
                    });
                    self.mark_path(&path);
                    RoutingOutcome::Fallback { from, to, path }
                }
            };

            if let Some(path) = outcome.path() {
                for pair in path.windows(2) {
                    if !pair[0].approx_eq(pair[1]) {
                        routing.wires.push(Wire {
                            net: net.to_string(),
                            start: pair[0],
                            end: pair[1],
                        });
                    }
                }
            }
            outcomes.push(outcome);
        }

        let found = junctions(routing.wires_of(net));
        routing.junctions.extend(found);
        outcomes
    }

    /// The direct path for a connection the search gave up on: both L shapes,
    /// then Z shapes whose middle leg moves out from the midpoint one grid
    /// step at a time. The first shape touching no other net wins, preferring
    /// ones that stay off part bodies. When every shape touches something the
    /// one with the fewest contacts is used and the touched nets are returned.
    fn fallback_path(
        &self,
        net: &str,
        start: Point,
        goal: Point,
        routing: &Routing,
    ) -> (Vec<Point>, Vec<String>) {
        let segments: Vec<&Wire> = routing
            .wires
            .iter()
            .chain(&routing.leads)
            .filter(|w| w.net != net)
            .collect();
        let mut points: Vec<(String, Point)> = Vec::new();
        for wire in &segments {
            points.push((wire.net.clone(), wire.start));
            points.push((wire.net.clone(), wire.end));
        }
        for label in routing.labels.iter().filter(|l| l.text != net) {
            points.push((label.text.clone(), label.pin_position));
            points.push((label.text.clone(), label.position));
        }
        for flag in &routing.no_connects {
            points.push((flag.pin.to_string(), flag.position));
        }

        let contacts = |path: &[Point]| -> BTreeSet<String> {
            let mut touched = BTreeSet::new();
            for pair in path.windows(2) {
                for (name, p) in &points {
                    if on_segment(*p, pair[0], pair[1]) {
                        touched.insert(name.clone());
                    }
                }
            }
            for &vertex in path {
                for wire in &segments {
                    if on_segment(vertex, wire.start, wire.end) {
                        touched.insert(wire.net.clone());
                    }
                }
            }
            touched
        };

        let mut best: Option<((usize, usize, usize), Vec<Point>, BTreeSet<String>)> = None;
        for (order, path) in self.fallback_candidates(start, goal).into_iter().enumerate() {
            let touched = contacts(&path);
            let key = (touched.len(), self.body_cells(&path), order);
            if best.as_ref().map_or(true, |(k, _, _)| key < *k) {
                best = Some((key, path, touched));
            }
        }
        match best {
            Some((_, path, touched)) => (path, touched.into_iter().collect()),
            None => (vec![start, goal], Vec::new()),
        }
    }

    fn fallback_candidates(&self, start: Point, goal: Point) -> Vec<Vec<Point>> {
        let g = self.config.grid;
        let mut candidates = vec![
            simplify(vec![start, Point::new(goal.x, start.y), goal]),
            simplify(vec![start, Point::new(start.x, goal.y), goal]),
        ];
        let mid_x = ((start.x + goal.x) / 2.0 / g).round() * g;
        let mid_y = ((start.y + goal.y) / 2.0 / g).round() * g;
        for step in 0..=self.config.search_margin.max(0) {
            let offsets = if step == 0 { vec![0] } else { vec![step, -step] };
            for offset in offsets {
                let x = mid_x + f64::from(offset) * g;
                candidates.push(simplify(vec![
                    start,
                    Point::new(x, start.y).canonical(),
                    Point::new(x, goal.y).canonical(),
                    goal,
                ]));
                let y = mid_y + f64::from(offset) * g;
                candidates.push(simplify(vec![
                    start,
                    Point::new(start.x, y).canonical(),
                    Point::new(goal.x, y).canonical(),
                    goal,
                ]));
            }
        }
        candidates
    }

    /// Obstacle cells a path runs through.
    fn body_cells(&self, path: &[Point]) -> usize {
        path.windows(2)
            .flat_map(|pair| self.segment_cells(pair[0], pair[1]))
            .filter(|cell| self.obstacles.contains(cell))
            .count()
    }

    /// Find a path between two cells using A*. `None` when no path exists
    /// inside the search window or the expansion budget runs out.
    fn find_path(&self, start: GridCell, goal: GridCell) -> Option<Vec<GridCell>> {
        if start == goal {
            return Some(vec![start]);
        }

        let margin = self.config.search_margin;
        let (min_x, max_x) = (start.x.min(goal.x) - margin, start.x.max(goal.x) + margin);
        let (min_y, max_y) = (start.y.min(goal.y) - margin, start.y.max(goal.y) + margin);
        let in_window =
            |c: GridCell| c.x >= min_x && c.x <= max_x && c.y >= min_y && c.y <= max_y;

        let mut open_set = BinaryHeap::new();
        let mut closed_set: HashSet<State> = HashSet::new();
        let mut came_from: HashMap<State, State> = HashMap::new();
        let mut g_scores: HashMap<State, u32> = HashMap::new();
        let mut expansions = 0;

        g_scores.insert((start, None), 0);
        open_set.push(AStarNode {
            cell: start,
            heading: None,
            g_cost: 0,
            h_cost: start.manhattan(goal),
        });

        while let Some(current) = open_set.pop() {
            let state = (current.cell, current.heading);
            if current.cell == goal {
                return Some(reconstruct_path(&came_from, state));
            }
            if !closed_set.insert(state) {
                continue;
            }
            expansions += 1;
            if expansions > self.config.expansion_budget {
                log::debug!("search from {start:?} to {goal:?} hit the expansion budget");
                return None;
            }

            // A crossing cell must be left straight ahead.
            let crossing = current.cell != start && self.has_run(current.cell);

            for heading in Heading::ALL {
                if let Some(h) = current.heading {
                    if heading == h.opposite() || (crossing && heading != h) {
                        continue;
                    }
                }
                let neighbor = current.cell.step(heading);
                if !in_window(neighbor) || !self.passable(neighbor, heading, goal) {
                    continue;
                }

                let turn = match current.heading {
                    Some(h) if h != heading => self.config.bend_penalty,
                    _ => 0,
                };
                let tentative_g_score = current.g_cost + 1 + turn;
                let next = (neighbor, Some(heading));
                if tentative_g_score < g_scores.get(&next).copied().unwrap_or(u32::MAX) {
                    came_from.insert(next, state);
                    g_scores.insert(next, tentative_g_score);
                    open_set.push(AStarNode {
                        cell: neighbor,
                        heading: Some(heading),
                        g_cost: tentative_g_score,
                        h_cost: neighbor.manhattan(goal),
                    });
                }
            }
        }

        None
    }

    /// Whether a path moving along `heading` may enter `cell`.
    fn passable(&self, cell: GridCell, heading: Heading, goal: GridCell) -> bool {
        if cell == goal {
            return true;
        }
        if self.obstacles.contains(&cell) {
            return false;
        }
        self.occupancy.get(&cell).map_or(true, |occupants| {
            occupants.iter().all(|o| match o {
                Occupant::Vertex => false,
                Occupant::Run { horizontal } => *horizontal != heading.is_horizontal(),
            })
        })
    }

    fn has_run(&self, cell: GridCell) -> bool {
        self.occupancy
            .get(&cell)
            .is_some_and(|o| o.iter().any(|o| matches!(o, Occupant::Run { .. })))
    }

    fn mark_path(&mut self, path: &[Point]) {
        for pair in path.windows(2) {
            self.mark_segment(pair[0], pair[1]);
        }
        if let [only] = path {
            self.mark_segment(*only, *only);
        }
    }

    /// Record an axis-aligned segment: vertices at both ends, runs between.
    fn mark_segment(&mut self, a: Point, b: Point) {
        let cells = self.segment_cells(a, b);
        let horizontal = cells.first().zip(cells.last()).is_some_and(|(a, b)| a.y == b.y);
        let last = cells.len() - 1;
        for (i, cell) in cells.into_iter().enumerate() {
            let occupant = if i == 0 || i == last {
                Occupant::Vertex
            } else {
                Occupant::Run { horizontal }
            };
            self.occupancy.entry(cell).or_default().push(occupant);
        }
    }

    /// Grid cells from `a` to `b` inclusive, never empty.
    fn segment_cells(&self, a: Point, b: Point) -> Vec<GridCell> {
        let (a, b) = (self.point_to_grid(a), self.point_to_grid(b));
        let heading = match (b.x.cmp(&a.x), b.y.cmp(&a.y)) {
            (Ordering::Greater, _) => Heading::East,
            (Ordering::Less, _) => Heading::West,
            (_, Ordering::Greater) => Heading::South,
            _ => Heading::North,
        };
        let mut cells = vec![a];
        let mut cell = a;
        // Diagonal segments never happen; the bound keeps a bad one finite.
        let mut remaining = a.manhattan(b);
        while cell != b && remaining > 0 {
            cell = cell.step(heading);
            cells.push(cell);
            remaining -= 1;
        }
        if cell != b {
            cells.push(b);
        }
        cells
    }

    /// Convert point to grid cell
    fn point_to_grid(&self, point: Point) -> GridCell {
        GridCell {
            x: (point.x / self.config.grid).round() as i32,
            y: (point.y / self.config.grid).round() as i32,
        }
    }

    /// Convert grid cell to point
    fn grid_to_point(&self, cell: GridCell) -> Point {
        Point::new(
            cell.x as f64 * self.config.grid,
            cell.y as f64 * self.config.grid,
        )
        .canonical()
    }
}

/// Reconstruct path from came_from map
fn reconstruct_path(came_from: &HashMap<State, State>, mut current: State) -> Vec<GridCell> {
    let mut path = vec![current.0];
    while let Some(&parent) = came_from.get(&current) {
        current = parent;
        path.push(current.0);
    }
    path.reverse();
    path
}

/// Keep the end points and every cell where the path turns.
fn corners(cells: &[GridCell]) -> Vec<GridCell> {
    let mut out: Vec<GridCell> = Vec::new();
    for (i, &cell) in cells.iter().enumerate() {
        let turns = match (i.checked_sub(1).map(|p| cells[p]), cells.get(i + 1)) {
            (Some(prev), Some(next)) => {
                (prev.x == cell.x) != (cell.x == next.x) || (prev.y == cell.y) != (cell.y == next.y)
            }
            _ => true,
        };
        if turns {
            out.push(cell);
        }
    }
    out
}

/// Drop repeated points and vertices a path runs straight through.
fn simplify(points: Vec<Point>) -> Vec<Point> {
    let aligned = |a: f64, b: f64| (a - b).abs() < 1e-3;
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        if out.last().is_some_and(|last| last.approx_eq(p)) {
            continue;
        }
        let straight = match out.as_slice() {
            [.., a, b] => {
                (aligned(a.x, b.x) && aligned(b.x, p.x)) || (aligned(a.y, b.y) && aligned(b.y, p.y))
            }
            _ => false,
        };
        if straight {
            out.pop();
        }
        out.push(p);
    }
    out
}

/// Whether `p` lies on the axis-aligned segment from `a` to `b`, ends
/// included.
pub fn on_segment(p: Point, a: Point, b: Point) -> bool {
    Rect::from_corners(a, b).inflate(1e-3).contains(p)
}

/// Prim's minimum spanning tree by Manhattan distance, as index pairs in the
/// order they join the tree.
pub fn spanning_tree(points: &[Point]) -> Vec<(usize, usize)> {
    let mut in_tree = vec![false; points.len()];
    let mut edges = Vec::new();
    if points.is_empty() {
        return edges;
    }
    in_tree[0] = true;
    for _ in 1..points.len() {
        let mut best: Option<(f64, usize, usize)> = None;
        for (i, a) in points.iter().enumerate().filter(|(i, _)| in_tree[*i]) {
            for (j, b) in points.iter().enumerate().filter(|(j, _)| !in_tree[*j]) {
                let d = a.manhattan(*b);
                if best.map_or(true, |(bd, _, _)| d < bd - 1e-9) {
                    best = Some((d, i, j));
                }
            }
        }
        if let Some((_, i, j)) = best {
            in_tree[j] = true;
            edges.push((i, j));
        }
    }
    edges
}

/// Points where three or more of the given wires end.
fn junctions<'a>(wires: impl Iterator<Item = &'a Wire>) -> Vec<Point> {
    let key = |p: Point| ((p.x * 100.0).round() as i64, (p.y * 100.0).round() as i64);
    let mut ends: BTreeMap<(i64, i64), (Point, usize)> = BTreeMap::new();
    for wire in wires {
        for p in [wire.start, wire.end] {
            ends.entry(key(p)).or_insert((p, 0)).1 += 1;
        }
    }
    ends.into_values()
        .filter(|(_, count)| *count >= 3)
        .map(|(p, _)| p)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(x: i32, y: i32) -> GridCell {
        GridCell { x, y }
    }

    #[test]
    fn corners_keep_turns_only() {
        let cells = [cell(0, 0), cell(1, 0), cell(2, 0), cell(2, 1), cell(2, 2)];
        assert_eq!(corners(&cells), vec![cell(0, 0), cell(2, 0), cell(2, 2)]);
        assert_eq!(corners(&cells[..1]), vec![cell(0, 0)]);
    }

    #[test]
    fn spanning_tree_joins_nearest_first() {
        let points = [
            Point::new(0.0, 0.0),
            Point::new(50.0, 5.0),
            Point::new(5.0, 5.0),
        ];
        assert_eq!(spanning_tree(&points), vec![(0, 2), (2, 1)]);
        assert!(spanning_tree(&points[..1]).is_empty());
    }

    #[test]
    fn junction_needs_three_wire_ends() {
        let w = |a: (f64, f64), b: (f64, f64)| Wire {
            net: "N".into(),
            start: Point::new(a.0, a.1),
            end: Point::new(b.0, b.1),
        };
        let tee = [
            w((0.0, 0.0), (5.0, 0.0)),
            w((5.0, 0.0), (10.0, 0.0)),
            w((5.0, 0.0), (5.0, 5.0)),
        ];
        assert_eq!(junctions(tee.iter()), vec![Point::new(5.0, 0.0)]);
        assert!(junctions(tee[..2].iter()).is_empty());
    }

    #[test]
    fn simplify_collapses_aligned_corners() {
        let a = Point::new(0.0, 0.0);
        let p = |x, y| Point::new(x, y);
        assert_eq!(simplify(vec![a, p(0.0, 0.0), p(0.0, 5.0)]), vec![a, p(0.0, 5.0)]);
        assert_eq!(
            simplify(vec![a, p(3.0, 0.0), p(3.0, 4.0)]),
            vec![a, p(3.0, 0.0), p(3.0, 4.0)]
        );
        // A Z whose middle leg has no length is a straight wire.
        assert_eq!(
            simplify(vec![a, p(2.0, 0.0), p(2.0, 0.0), p(6.0, 0.0)]),
            vec![a, p(6.0, 0.0)]
        );
    }

    #[test]
    fn points_on_segments() {
        let (a, b) = (Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!(on_segment(a, a, b));
        assert!(on_segment(Point::new(5.0, 0.0), a, b));
        assert!(!on_segment(Point::new(5.0, 0.5), a, b));
        assert!(!on_segment(Point::new(10.5, 0.0), a, b));
    }

    #[test]
    fn heap_pops_lowest_cost_first() {
        let mut heap = BinaryHeap::new();
        for (g, h) in [(5, 5), (1, 2), (3, 0)] {
            heap.push(AStarNode {
                cell: cell(g as i32, h as i32),
                heading: None,
                g_cost: g,
                h_cost: h,
            });
        }
        // Equal f: the one closer to the goal wins.
        let first = heap.pop().map(|n| (n.f_cost(), n.h_cost));
        let second = heap.pop().map(|n| (n.f_cost(), n.h_cost));
        assert_eq!(first, Some((3, 0)));
        assert_eq!(second, Some((3, 2)));
    }
}
