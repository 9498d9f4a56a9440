//! Connected components and outer boundary tracing on binary masks.

use crate::BinaryImage;

/// Moore neighbourhood, clockwise in image space (y down) starting east.
const DIRS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Bounding box, area and raster-first pixel of one component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Component {
    pub label: u32,
    pub area: usize,
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
    /// Topmost, then leftmost pixel.
    pub start: (usize, usize),
}

impl Component {
    pub fn touches_border(&self, width: usize, height: usize) -> bool {
        self.min_x == 0 || self.min_y == 0 || self.max_x + 1 >= width || self.max_y + 1 >= height
    }
}

/// Per-pixel labels (`0` = background, `k` = `components[k - 1]`).
#[derive(Clone, Debug)]
pub struct ComponentMap {
    pub width: usize,
    pub height: usize,
    pub labels: Vec<u32>,
    pub components: Vec<Component>,
}

impl ComponentMap {
    #[inline]
    fn label_at(&self, x: i32, y: i32) -> u32 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.labels[y as usize * self.width + x as usize]
    }
}

/// One closed outer boundary, in tracing order (clockwise in image space).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contour {
    pub label: u32,
    pub points: Vec<[i32; 2]>,
}

struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new() -> Self {
        Self { parent: vec![0] }
    }

    fn make(&mut self) -> u32 {
        let id = self.parent.len() as u32;
        self.parent.push(id);
        id
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grand = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grand;
            x = grand;
        }
        x
    }

    fn union(&mut self, a: u32, b: u32) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi as usize] = lo;
        }
    }
}

/// Two-pass 8-connected labelling of dark pixels.
///
/// Components are numbered in raster order of their first pixel.
pub fn label_components(bin: &BinaryImage) -> ComponentMap {
    let (w, h) = (bin.width, bin.height);
    let mut labels = vec![0u32; w * h];
    let mut uf = UnionFind::new();

    for y in 0..h {
        for x in 0..w {
            if !bin.is_dark(x, y) {
                continue;
            }
            let mut current = 0u32;
            let mut neighbours = [0u32; 4];
            if x > 0 {
                neighbours[0] = labels[y * w + x - 1];
            }
            if y > 0 {
                let up = (y - 1) * w;
                if x > 0 {
                    neighbours[1] = labels[up + x - 1];
                }
                neighbours[2] = labels[up + x];
                if x + 1 < w {
                    neighbours[3] = labels[up + x + 1];
                }
            }
            for &n in neighbours.iter().filter(|&&n| n != 0) {
                if current == 0 {
                    current = n;
                } else if n != current {
                    uf.union(current, n);
                }
            }
            if current == 0 {
                current = uf.make();
            }
            labels[y * w + x] = current;
        }
    }

    // Resolve provisional labels to compact ids in raster order.
    let mut remap = vec![0u32; uf.parent.len()];
    let mut components: Vec<Component> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let provisional = labels[idx];
            if provisional == 0 {
                continue;
            }
            let root = uf.find(provisional) as usize;
            if remap[root] == 0 {
                components.push(Component {
                    label: components.len() as u32 + 1,
                    area: 0,
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                    start: (x, y),
                });
                remap[root] = components.len() as u32;
            }
            let label = remap[root];
            labels[idx] = label;
            let c = &mut components[label as usize - 1];
            c.area += 1;
            c.min_x = c.min_x.min(x);
            c.max_x = c.max_x.max(x);
            c.max_y = c.max_y.max(y);
        }
    }

    ComponentMap {
        width: w,
        height: h,
        labels,
        components,
    }
}

/// Trace the outer boundary of every component that does not touch the image
/// border and whose boundary length lies in `min_points..=max_points`.
pub fn trace_outer_contours(
    map: &ComponentMap,
    min_points: usize,
    max_points: usize,
) -> Vec<Contour> {
    let mut out = Vec::new();
    for comp in &map.components {
        if comp.touches_border(map.width, map.height) {
            continue;
        }
        let bw = comp.max_x - comp.min_x + 1;
        let bh = comp.max_y - comp.min_y + 1;
        if 2 * (bw + bh) < min_points {
            continue;
        }
        let points = trace_component(map, comp);
        if points.len() < min_points || points.len() > max_points {
            continue;
        }
        out.push(Contour {
            label: comp.label,
            points,
        });
    }
    out
}

/// Direction index of a unit step, falling back to west.
fn dir_index(dx: i32, dy: i32) -> usize {
    DIRS.iter().position(|&d| d == (dx, dy)).unwrap_or(4)
}

/// Moore-neighbour tracing with Jacob's stopping criterion.
fn trace_component(map: &ComponentMap, comp: &Component) -> Vec<[i32; 2]> {
    let label = comp.label;
    let start = [comp.start.0 as i32, comp.start.1 as i32];
    let mut points = vec![start];
    let mut p = start;
    // The raster-first pixel always has background to its west.
    let mut back = 4usize;
    let mut second: Option<[i32; 2]> = None;

    for _ in 0..(4 * comp.area + 8) {
        let mut next = None;
        for i in 1..=8 {
            let d = (back + i) % 8;
            let q = [p[0] + DIRS[d].0, p[1] + DIRS[d].1];
            if map.label_at(q[0], q[1]) == label {
                next = Some((q, d));
                break;
            }
        }
        let Some((q, d)) = next else {
            break;
        };

        if p == start {
            match second {
                Some(s) if s == q => break,
                None => second = Some(q),
                _ => {}
            }
        }

        let prev = DIRS[(d + 7) % 8];
        let bg = [p[0] + prev.0, p[1] + prev.1];
        back = dir_index(bg[0] - q[0], bg[1] - q[1]);
        points.push(q);
        p = q;
    }

    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(w: usize, h: usize, rects: &[(usize, usize, usize, usize)]) -> BinaryImage {
        let mut bin = BinaryImage::new(w, h);
        for &(x0, y0, rw, rh) in rects {
            for y in y0..y0 + rh {
                for x in x0..x0 + rw {
                    bin.data[y * w + x] = 1;
                }
            }
        }
        bin
    }

    #[test]
    fn labels_separate_and_diagonal_components() {
        let mut bin = mask(12, 8, &[(1, 1, 3, 3), (7, 2, 2, 2)]);
        // Diagonal touch joins under 8-connectivity.
        bin.data[4 * 12 + 4] = 1;
        let map = label_components(&bin);
        assert_eq!(map.components.len(), 2);
        assert_eq!(map.components[0].area, 10);
        assert_eq!(map.components[0].start, (1, 1));
        assert_eq!((map.components[0].max_x, map.components[0].max_y), (4, 4));
        assert_eq!(map.components[1].area, 4);
    }

    #[test]
    fn u_shape_merges_into_one_label() {
        let bin = mask(10, 10, &[(2, 2, 1, 5), (6, 2, 1, 5), (2, 6, 5, 1)]);
        let map = label_components(&bin);
        assert_eq!(map.components.len(), 1);
        assert_eq!(map.components[0].area, 13);
    }

    #[test]
    fn traces_rectangle_boundary_clockwise() {
        let bin = mask(10, 10, &[(2, 3, 5, 4)]);
        let map = label_components(&bin);
        let contours = trace_outer_contours(&map, 1, 1000);
        assert_eq!(contours.len(), 1);
        let pts = &contours[0].points;
        // 5x4 filled rectangle has 2 * (5 + 4) - 4 boundary pixels.
        assert_eq!(pts.len(), 14);
        assert_eq!(pts[0], [2, 3]);
        assert_eq!(pts[1], [3, 3]);
        assert!(pts.contains(&[6, 6]));
        assert!(!pts.contains(&[4, 4]));
    }

    #[test]
    fn hollow_square_yields_outer_boundary_only() {
        let bin = mask(12, 12, &[(2, 2, 7, 1), (2, 8, 7, 1), (2, 2, 1, 7), (8, 2, 1, 7)]);
        let map = label_components(&bin);
        let contours = trace_outer_contours(&map, 1, 1000);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].points.len(), 24);
    }

    #[test]
    fn skips_border_touching_and_small_components() {
        let bin = mask(10, 10, &[(0, 0, 3, 3), (5, 5, 1, 1)]);
        let map = label_components(&bin);
        assert!(trace_outer_contours(&map, 3, 1000).is_empty());
        let single = trace_outer_contours(&map, 1, 1000);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].points, vec![[5, 5]]);
    }
}
