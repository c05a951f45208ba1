//! The world: owner of all agents and of the coarse consistency lock

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::nvm::error::{EngineError, EngineResult};
use crate::workspace::EngineConfig;

use super::agentset::AgentSet;
use super::kind::{AgentCell, AgentKind, AgentRef};

/// One turtle's state.
#[derive(Debug)]
pub struct Turtle {
    handle: AgentRef,
    /// X coordinate in world units.
    pub x: f64,
    /// Y coordinate in world units.
    pub y: f64,
    /// Heading in degrees, clockwise from north.
    pub heading: f64,
}

impl Turtle {
    /// Handle to this turtle.
    pub fn handle(&self) -> &AgentRef {
        &self.handle
    }
}

/// One patch's state. Patches are created with the world and never die.
#[derive(Debug)]
pub struct Patch {
    handle: AgentRef,
    /// Patch x coordinate.
    pub px: i64,
    /// Patch y coordinate.
    pub py: i64,
    /// Patch color.
    pub pcolor: f64,
}

impl Patch {
    /// Handle to this patch.
    pub fn handle(&self) -> &AgentRef {
        &self.handle
    }
}

/// One link's state.
#[derive(Debug)]
pub struct Link {
    handle: AgentRef,
    /// First endpoint.
    pub end1: AgentRef,
    /// Second endpoint.
    pub end2: AgentRef,
    /// Breed this link belongs to.
    pub breed: String,
}

impl Link {
    /// Handle to this link.
    pub fn handle(&self) -> &AgentRef {
        &self.handle
    }
}

/// A link breed whose directedness is fixed by the first link created in it.
#[derive(Debug)]
pub struct LinkBreed {
    /// Breed name.
    pub name: String,
    /// `None` until the first link fixes the breed's directedness.
    pub directed: Option<bool>,
}

impl LinkBreed {
    /// Assert the breed is not directed; raised before link creation.
    pub fn must_not_be_directed(&self) -> EngineResult<()> {
        if self.directed == Some(true) {
            return Err(EngineError::Breed(format!(
                "{} is a directed breed and cannot hold undirected links",
                self.name
            )));
        }
        Ok(())
    }

    /// Assert the breed is not undirected; raised before link creation.
    pub fn must_not_be_undirected(&self) -> EngineResult<()> {
        if self.directed == Some(false) {
            return Err(EngineError::Breed(format!(
                "{} is an undirected breed and cannot hold directed links",
                self.name
            )));
        }
        Ok(())
    }
}

/// Owner of every agent, the world RNG, and the coarse view lock.
///
/// Mutation goes through `&mut World` on the scheduler's thread of control;
/// collaborators that need a consistent multi-agent view (rendering,
/// picking) hold [`World::view_lock`] for the duration of their read.
pub struct World {
    next_turtle_id: i64,
    next_link_id: i64,
    turtles: BTreeMap<i64, Turtle>,
    patches: Vec<Patch>,
    links: BTreeMap<i64, Link>,
    link_breeds: BTreeMap<String, LinkBreed>,
    observer: AgentRef,
    rng: StdRng,
    min_pxcor: i64,
    max_pxcor: i64,
    min_pycor: i64,
    max_pycor: i64,
    view_lock: Arc<Mutex<()>>,
}

impl World {
    /// Create a world from configuration: patch grid allocated eagerly,
    /// RNG seeded from the config.
    pub fn new(config: &EngineConfig) -> Self {
        let observer = AgentRef::new(AgentKind::Observer, Arc::new(AgentCell::new(0)));
        let half_w = config.world_width as i64 / 2;
        let half_h = config.world_height as i64 / 2;
        let (min_pxcor, max_pxcor) = (-half_w, half_w);
        let (min_pycor, max_pycor) = (-half_h, half_h);

        let mut patches = Vec::new();
        let mut patch_id = 0;
        for py in min_pycor..=max_pycor {
            for px in min_pxcor..=max_pxcor {
                patches.push(Patch {
                    handle: AgentRef::new(AgentKind::Patch, Arc::new(AgentCell::new(patch_id))),
                    px,
                    py,
                    pcolor: 0.0,
                });
                patch_id += 1;
            }
        }

        Self {
            next_turtle_id: 0,
            next_link_id: 0,
            turtles: BTreeMap::new(),
            patches,
            links: BTreeMap::new(),
            link_breeds: BTreeMap::new(),
            observer,
            rng: StdRng::seed_from_u64(config.seed),
            min_pxcor,
            max_pxcor,
            min_pycor,
            max_pycor,
            view_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The single observer agent.
    pub fn observer(&self) -> &AgentRef {
        &self.observer
    }

    /// Lock protecting consistent multi-agent reads by collaborators.
    pub fn view_lock(&self) -> Arc<Mutex<()>> {
        self.view_lock.clone()
    }

    /// The world RNG (drives shufflerator ordering).
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Create a turtle at the origin with heading 0.
    pub fn create_turtle(&mut self) -> AgentRef {
        let id = self.next_turtle_id;
        self.next_turtle_id += 1;
        let handle = AgentRef::new(AgentKind::Turtle, Arc::new(AgentCell::new(id)));
        self.turtles.insert(
            id,
            Turtle {
                handle: handle.clone(),
                x: 0.0,
                y: 0.0,
                heading: 0.0,
            },
        );
        handle
    }

    /// Create a turtle inheriting the parent's position and heading.
    pub fn hatch(&mut self, parent: &AgentRef) -> EngineResult<AgentRef> {
        let parent = self.turtle(parent)?;
        let (x, y, heading) = (parent.x, parent.y, parent.heading);
        let child = self.create_turtle();
        let t = self
            .turtles
            .get_mut(&child.id())
            .expect("freshly created turtle must exist");
        t.x = x;
        t.y = y;
        t.heading = heading;
        Ok(child)
    }

    /// Kill a turtle: its identity slot is recycled so every outstanding
    /// handle observes death, its links die with it, and storage is freed.
    pub fn kill_turtle(&mut self, agent: &AgentRef) -> EngineResult<()> {
        let turtle = self.turtles.remove(&agent.id()).ok_or_else(|| {
            EngineError::DeadAgent {
                kind: agent.kind.noun().to_string(),
            }
        })?;
        let dead_links: Vec<i64> = self
            .links
            .iter()
            .filter(|(_, l)| l.end1 == turtle.handle || l.end2 == turtle.handle)
            .map(|(id, _)| *id)
            .collect();
        for id in dead_links {
            if let Some(link) = self.links.remove(&id) {
                link.handle.cell().mark_dead();
            }
        }
        turtle.handle.cell().mark_dead();
        Ok(())
    }

    /// Look up a live turtle by handle.
    pub fn turtle(&self, agent: &AgentRef) -> EngineResult<&Turtle> {
        self.turtles.get(&agent.id()).ok_or_else(|| {
            EngineError::DeadAgent {
                kind: agent.kind.noun().to_string(),
            }
        })
    }

    /// Look up a live turtle mutably by handle.
    pub fn turtle_mut(&mut self, agent: &AgentRef) -> EngineResult<&mut Turtle> {
        self.turtles.get_mut(&agent.id()).ok_or_else(|| {
            EngineError::DeadAgent {
                kind: agent.kind.noun().to_string(),
            }
        })
    }

    /// Move a turtle `distance` along its heading, wrapping at the world
    /// envelope.
    pub fn forward(&mut self, agent: &AgentRef, distance: f64) -> EngineResult<()> {
        let (min_x, max_x) = (self.min_pxcor as f64 - 0.5, self.max_pxcor as f64 + 0.5);
        let (min_y, max_y) = (self.min_pycor as f64 - 0.5, self.max_pycor as f64 + 0.5);
        let turtle = self.turtle_mut(agent)?;
        let radians = turtle.heading.to_radians();
        turtle.x = wrap(turtle.x + distance * radians.sin(), min_x, max_x);
        turtle.y = wrap(turtle.y + distance * radians.cos(), min_y, max_y);
        Ok(())
    }

    /// Number of live turtles.
    pub fn turtle_count(&self) -> usize {
        self.turtles.len()
    }

    /// Agent set of all live turtles, in who-number order.
    pub fn turtles_agentset(&self) -> AgentSet {
        AgentSet::from_refs(
            AgentKind::Turtle,
            self.turtles.values().map(|t| t.handle.clone()).collect(),
        )
    }

    /// Agent set holding only the observer.
    pub fn observer_agentset(&self) -> AgentSet {
        AgentSet::from_refs(AgentKind::Observer, vec![self.observer.clone()])
    }

    /// Patch at the given coordinates, if inside the world.
    pub fn patch_at(&self, px: i64, py: i64) -> Option<&Patch> {
        if px < self.min_pxcor || px > self.max_pxcor || py < self.min_pycor || py > self.max_pycor
        {
            return None;
        }
        let width = (self.max_pxcor - self.min_pxcor + 1) as usize;
        let idx = (py - self.min_pycor) as usize * width + (px - self.min_pxcor) as usize;
        self.patches.get(idx)
    }

    /// Declare a link breed. Directedness stays open until the first link.
    pub fn declare_link_breed(&mut self, name: &str) {
        self.link_breeds
            .entry(name.to_string())
            .or_insert_with(|| LinkBreed {
                name: name.to_string(),
                directed: None,
            });
    }

    /// Look up a declared link breed.
    pub fn link_breed(&self, name: &str) -> Option<&LinkBreed> {
        self.link_breeds.get(name)
    }

    /// Create a link between two live turtles in the given breed.
    ///
    /// Structural invariants are asserted before any mutation: both
    /// endpoints live and distinct, and the breed's directedness compatible
    /// with the requested link.
    pub fn create_link(
        &mut self,
        breed_name: &str,
        end1: &AgentRef,
        end2: &AgentRef,
        directed: bool,
    ) -> EngineResult<AgentRef> {
        for end in [end1, end2] {
            if end.kind != AgentKind::Turtle {
                return Err(EngineError::Breed(format!(
                    "links may only connect turtles, not {}",
                    end.kind.noun()
                )));
            }
            self.turtle(end)?;
        }
        if end1 == end2 {
            return Err(EngineError::Breed(
                "a turtle cannot link to itself".to_string(),
            ));
        }
        let breed = self
            .link_breeds
            .get_mut(breed_name)
            .ok_or_else(|| EngineError::Breed(format!("undeclared link breed {breed_name}")))?;
        if directed {
            breed.must_not_be_undirected()?;
        } else {
            breed.must_not_be_directed()?;
        }
        breed.directed = Some(directed);

        let id = self.next_link_id;
        self.next_link_id += 1;
        let handle = AgentRef::new(AgentKind::Link, Arc::new(AgentCell::new(id)));
        self.links.insert(
            id,
            Link {
                handle: handle.clone(),
                end1: end1.clone(),
                end2: end2.clone(),
                breed: breed_name.to_string(),
            },
        );
        Ok(handle)
    }

    /// Number of live links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

fn wrap(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    min + (value - min).rem_euclid(span)
}
