// ============================================================================
// SELECTION - committed base shape + pending continuation + transforms
// ============================================================================
//
// The effective selection is `combine(base, mode, continuation)` with the
// interim transform applied on top. Starting a new continuation always
// commits a pending interim transform first, so a continuation edit and a
// transform edit are never open at the same time.

use std::ops::{Deref, DerefMut};

use crate::geometry::{
    combine, Affine, CombineMode, MatrixOrder, Outline, Point, PointF, Rect, RectF, Region,
};

/// Default clip rectangle for new selections.
pub const DEFAULT_CLIP_RECT: Rect = Rect::new(0, 0, 65535, 65535);

/// Notification sent to selection listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionEvent {
    /// Sent once before the outermost of a group of nested changes.
    Changing,
    /// Sent once after the outermost of a group of nested changes.
    Changed,
}

pub type SelectionListener = Box<dyn FnMut(SelectionEvent) + Send>;

/// The shape fed into a continuation.
#[derive(Clone, Debug, PartialEq)]
pub enum ContinuationShape {
    Rect(Rect),
    Ellipse(RectF),
    /// One open figure of connected line segments.
    Lines(Vec<PointF>),
    /// Closed polygons, one figure each.
    Polygons(Vec<Vec<PointF>>),
}

/// Everything needed to reproduce a selection. Cloning is a deep copy, so
/// snapshots stay valid for undo/redo.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionData {
    pub base_path: Outline,
    pub continuation: Outline,
    pub continuation_mode: CombineMode,
    /// Product of every interim transform committed since the last
    /// continuation was started.
    pub cumulative_transform: Affine,
    pub interim_transform: Affine,
}

impl Default for SelectionData {
    fn default() -> Self {
        Self {
            base_path: Outline::new(),
            continuation: Outline::new(),
            continuation_mode: CombineMode::Xor,
            cumulative_transform: Affine::identity(),
            interim_transform: Affine::identity(),
        }
    }
}

pub struct Selection {
    data: SelectionData,
    clip_rect: Rect,
    changing_depth: i32,
    listeners: Vec<(usize, SelectionListener)>,
    next_listener_id: usize,
}

impl Default for Selection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("data", &self.data)
            .field("clip_rect", &self.clip_rect)
            .field("changing_depth", &self.changing_depth)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Keeps a selection inside a Changing/Changed pair for as long as it lives.
pub struct ChangeScope<'a> {
    selection: &'a mut Selection,
}

impl Deref for ChangeScope<'_> {
    type Target = Selection;
    fn deref(&self) -> &Selection {
        self.selection
    }
}

impl DerefMut for ChangeScope<'_> {
    fn deref_mut(&mut self) -> &mut Selection {
        self.selection
    }
}

impl Drop for ChangeScope<'_> {
    fn drop(&mut self) {
        self.selection.perform_changed();
    }
}

impl Selection {
    pub fn new() -> Self {
        Self::with_clip_rect(DEFAULT_CLIP_RECT)
    }

    pub fn with_clip_rect(clip_rect: Rect) -> Self {
        Self {
            data: SelectionData::default(),
            clip_rect,
            changing_depth: 0,
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    // ========================================================================
    // NOTIFICATIONS
    // ========================================================================

    /// Register a listener; returns an id for [`Selection::unsubscribe`].
    pub fn subscribe(&mut self, listener: impl FnMut(SelectionEvent) + Send + 'static) -> usize {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: usize) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, event: SelectionEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    /// Enter a change. Only the outermost call notifies listeners.
    pub fn perform_changing(&mut self) {
        if self.changing_depth == 0 {
            self.notify(SelectionEvent::Changing);
        }
        self.changing_depth += 1;
    }

    /// Leave a change. Notifies listeners when the outermost change ends.
    ///
    /// # Panics
    /// When called without a matching [`Selection::perform_changing`].
    pub fn perform_changed(&mut self) {
        if self.changing_depth <= 0 {
            panic!("Changed raised without a corresponding Changing beforehand");
        }
        self.changing_depth -= 1;
        if self.changing_depth == 0 {
            self.notify(SelectionEvent::Changed);
        }
    }

    /// Open a change scope; the matching Changed fires when it is dropped.
    pub fn begin_change(&mut self) -> ChangeScope<'_> {
        self.perform_changing();
        ChangeScope { selection: self }
    }

    pub fn change_depth(&self) -> i32 {
        self.changing_depth
    }

    // ========================================================================
    // STATE ACCESS
    // ========================================================================

    pub fn clip_rect(&self) -> Rect {
        self.clip_rect
    }

    pub fn set_clip_rect(&mut self, rect: Rect) {
        self.clip_rect = rect;
    }

    pub fn data(&self) -> &SelectionData {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.base_path.is_empty() && self.data.continuation.is_empty()
    }

    pub fn continuation_mode(&self) -> CombineMode {
        self.data.continuation_mode
    }

    pub fn cumulative_transform(&self) -> Affine {
        self.data.cumulative_transform
    }

    pub fn interim_transform(&self) -> Affine {
        self.data.interim_transform
    }

    /// Snapshot for undo.
    pub fn save(&self) -> SelectionData {
        self.data.clone()
    }

    pub fn restore(&mut self, state: &SelectionData) {
        let mut s = self.begin_change();
        s.data = state.clone();
    }

    // ========================================================================
    // CONTINUATION
    // ========================================================================

    fn reset_cumulative_transform(&mut self) {
        self.data.cumulative_transform = Affine::identity();
    }

    /// Replace the continuation with `shape`, combined into the base path
    /// with `mode`.
    pub fn set_continuation(&mut self, shape: ContinuationShape, mode: CombineMode) {
        let mut s = self.begin_change();
        s.commit_interim_transform();
        s.reset_cumulative_transform();
        s.data.continuation_mode = mode;
        let cont = &mut s.data.continuation;
        cont.reset();
        match shape {
            ContinuationShape::Rect(r) => cont.add_rectangle(RectF::from(r)),
            ContinuationShape::Ellipse(r) => cont.add_ellipse(r),
            ContinuationShape::Lines(pts) => cont.add_lines(&pts),
            ContinuationShape::Polygons(polys) => cont.add_polygons(&polys),
        }
    }

    pub fn set_continuation_rect(&mut self, rect: Rect, mode: CombineMode) {
        self.set_continuation(ContinuationShape::Rect(rect), mode);
    }

    pub fn set_continuation_ellipse(&mut self, rect: RectF, mode: CombineMode) {
        self.set_continuation(ContinuationShape::Ellipse(rect), mode);
    }

    pub fn set_continuation_lines(&mut self, points: &[PointF], mode: CombineMode) {
        self.set_continuation(ContinuationShape::Lines(points.to_vec()), mode);
    }

    pub fn set_continuation_polygons(&mut self, polygons: &[Vec<PointF>], mode: CombineMode) {
        self.set_continuation(ContinuationShape::Polygons(polygons.to_vec()), mode);
    }

    /// Use a whole outline as the continuation. Only valid while the base
    /// path is empty.
    pub fn set_continuation_outline(&mut self, outline: &Outline, mode: CombineMode) -> crate::Result<()> {
        if !self.data.base_path.is_empty() {
            return Err(crate::Error::InvalidOperation(
                "base path must be empty to set an outline continuation".into(),
            ));
        }
        let mut s = self.begin_change();
        s.commit_interim_transform();
        s.reset_cumulative_transform();
        s.data.continuation_mode = mode;
        s.data.continuation = outline.clone();
        Ok(())
    }

    pub fn reset_continuation(&mut self) {
        let mut s = self.begin_change();
        s.commit_interim_transform();
        s.reset_cumulative_transform();
        s.data.continuation.reset();
    }

    /// Fold the continuation into the base path.
    pub fn commit_continuation(&mut self) {
        let mut s = self.begin_change();
        s.data.continuation.close_all_figures();
        let base = s.create_path();
        s.data.base_path = base;
        s.data.continuation.reset();
        s.data.continuation_mode = CombineMode::Xor;
    }

    pub fn reset(&mut self) {
        let mut s = self.begin_change();
        s.data.base_path.reset();
        s.data.continuation.reset();
        s.data.cumulative_transform = Affine::identity();
        s.data.interim_transform = Affine::identity();
    }

    // ========================================================================
    // TRANSFORMS
    // ========================================================================

    pub fn set_interim_transform(&mut self, m: Affine) {
        let mut s = self.begin_change();
        s.data.interim_transform = m;
    }

    /// Bake the interim transform into the paths. No-op (and no
    /// notification) when it is the identity.
    pub fn commit_interim_transform(&mut self) {
        if self.data.interim_transform.is_identity() {
            return;
        }
        let mut s = self.begin_change();
        let m = s.data.interim_transform;
        s.data.base_path.transform(&m);
        s.data.continuation.transform(&m);
        s.data.cumulative_transform.multiply(&m, MatrixOrder::Append);
        s.data.interim_transform = Affine::identity();
    }

    pub fn reset_interim_transform(&mut self) {
        let mut s = self.begin_change();
        s.data.interim_transform = Affine::identity();
    }

    // ========================================================================
    // DERIVED SHAPES
    // ========================================================================

    pub fn create_path(&self) -> Outline {
        self.create_path_with(true)
    }

    /// A freshly combined outline; the caller owns it.
    pub fn create_path_with(&self, apply_interim_transform: bool) -> Outline {
        let mut path = combine(
            &self.data.base_path,
            self.data.continuation_mode,
            &self.data.continuation,
        );
        if apply_interim_transform {
            path.transform(&self.data.interim_transform);
        }
        path
    }

    /// Outline following pixel edges exactly.
    pub fn create_pixelated_path(&self) -> Outline {
        Outline::from_region(self.create_path().region())
    }

    pub fn create_region_raw(&self) -> Region {
        self.create_path().region().clone()
    }

    /// Selected pixels clipped to the clip rectangle. An empty selection
    /// means "everything", i.e. the whole clip rectangle.
    pub fn create_region(&self) -> Region {
        if self.is_empty() {
            return Region::from_rect(self.clip_rect);
        }
        let mut region = self.create_region_raw();
        region.intersect(self.clip_rect);
        region
    }

    /// Whether pixel `p` is selected (tested at the pixel centre).
    pub fn is_visible(&self, p: Point) -> bool {
        self.create_path()
            .is_visible(PointF::new(p.x as f64 + 0.5, p.y as f64 + 0.5))
    }

    pub fn bounds(&self) -> Rect {
        self.bounds_with(true)
    }

    pub fn bounds_with(&self, apply_interim_transform: bool) -> Rect {
        self.bounds_f_with(apply_interim_transform).round_out()
    }

    pub fn bounds_f(&self) -> RectF {
        self.bounds_f_with(true)
    }

    pub fn bounds_f_with(&self, apply_interim_transform: bool) -> RectF {
        self.create_path_with(apply_interim_transform).bounds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(sel: &mut Selection) -> Arc<Mutex<Vec<SelectionEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        sel.subscribe(move |e| sink.lock().unwrap().push(e));
        events
    }

    #[test]
    fn test_new_selection_is_empty_and_covers_clip() {
        let sel = Selection::new();
        assert!(sel.is_empty());
        assert_eq!(sel.clip_rect(), DEFAULT_CLIP_RECT);
        assert_eq!(sel.create_region(), Region::from_rect(DEFAULT_CLIP_RECT));
        assert_eq!(sel.continuation_mode(), CombineMode::Xor);
    }

    #[test]
    fn test_continuation_commit_matches_combine_from_empty() {
        for mode in CombineMode::ALL {
            let mut sel = Selection::new();
            let rect = Rect::new(2, 3, 10, 5);
            sel.set_continuation_rect(rect, mode);
            sel.commit_continuation();

            let mut shape = Outline::new();
            shape.add_rectangle(RectF::from(rect));
            let mut expected = combine(&Outline::new(), mode, &shape);
            expected.close_all_figures();
            assert_eq!(sel.data().base_path.region(), expected.region(), "mode {}", mode);
            assert!(sel.data().continuation.is_empty());
            assert_eq!(sel.continuation_mode(), CombineMode::Xor);
        }
    }

    #[test]
    fn test_union_then_exclude() {
        let mut sel = Selection::new();
        sel.set_continuation_rect(Rect::new(0, 0, 10, 10), CombineMode::Replace);
        sel.commit_continuation();
        sel.set_continuation_rect(Rect::new(5, 0, 10, 10), CombineMode::Union);
        assert_eq!(sel.create_region().area(), 150);
        sel.commit_continuation();
        sel.set_continuation_rect(Rect::new(0, 0, 15, 5), CombineMode::Exclude);
        assert_eq!(sel.create_region().area(), 75);
        assert!(sel.is_visible(Point::new(14, 9)));
        assert!(!sel.is_visible(Point::new(14, 4)));
        assert_eq!(sel.bounds(), Rect::new(0, 5, 15, 5));
    }

    #[test]
    fn test_commit_interim_post_multiplies_cumulative() {
        let mut sel = Selection::new();
        sel.set_continuation_rect(Rect::new(0, 0, 4, 4), CombineMode::Replace);
        sel.set_interim_transform(Affine::scaling(2.0, 2.0));
        assert_eq!(sel.bounds(), Rect::new(0, 0, 8, 8));
        assert_eq!(sel.bounds_with(false), Rect::new(0, 0, 4, 4));

        sel.commit_interim_transform();
        assert!(sel.interim_transform().is_identity());
        assert_eq!(sel.cumulative_transform(), Affine::scaling(2.0, 2.0));

        sel.set_interim_transform(Affine::translation(1.0, 0.0));
        sel.commit_interim_transform();
        let expected = Affine::scaling(2.0, 2.0).then(&Affine::translation(1.0, 0.0));
        assert_eq!(sel.cumulative_transform(), expected);
        assert_eq!(sel.bounds(), Rect::new(1, 0, 8, 8));
    }

    #[test]
    fn test_new_continuation_commits_interim_and_resets_cumulative() {
        let mut sel = Selection::new();
        sel.set_continuation_rect(Rect::new(0, 0, 4, 4), CombineMode::Replace);
        sel.commit_continuation();
        sel.set_interim_transform(Affine::translation(10.0, 0.0));
        sel.set_continuation_rect(Rect::new(0, 0, 1, 1), CombineMode::Union);
        assert!(sel.interim_transform().is_identity());
        assert!(sel.cumulative_transform().is_identity());
        assert_eq!(sel.data().base_path.bounds(), RectF::new(10.0, 0.0, 4.0, 4.0));
    }

    #[test]
    fn test_outline_continuation_requires_empty_base() {
        let mut sel = Selection::new();
        let mut o = Outline::new();
        o.add_rectangle(RectF::new(0.0, 0.0, 2.0, 2.0));
        assert!(sel.set_continuation_outline(&o, CombineMode::Union).is_ok());
        sel.commit_continuation();
        let err = sel.set_continuation_outline(&o, CombineMode::Union);
        assert!(matches!(err, Err(crate::Error::InvalidOperation(_))));
    }

    #[test]
    fn test_nested_changes_fire_one_pair() {
        let mut sel = Selection::new();
        let events = recorder(&mut sel);
        sel.set_interim_transform(Affine::translation(1.0, 1.0));
        events.lock().unwrap().clear();

        // commits the interim transform inside its own change scope
        sel.set_continuation_rect(Rect::new(0, 0, 3, 3), CombineMode::Union);
        assert_eq!(
            *events.lock().unwrap(),
            vec![SelectionEvent::Changing, SelectionEvent::Changed]
        );
        assert_eq!(sel.change_depth(), 0);
    }

    #[test]
    fn test_manual_change_bracket() {
        let mut sel = Selection::new();
        let events = recorder(&mut sel);
        sel.perform_changing();
        sel.reset();
        sel.reset_continuation();
        assert_eq!(*events.lock().unwrap(), vec![SelectionEvent::Changing]);
        sel.perform_changed();
        assert_eq!(
            *events.lock().unwrap(),
            vec![SelectionEvent::Changing, SelectionEvent::Changed]
        );
    }

    #[test]
    #[should_panic(expected = "without a corresponding Changing")]
    fn test_changed_without_changing_panics() {
        let mut sel = Selection::new();
        sel.perform_changed();
    }

    #[test]
    fn test_save_restore_round_trip() {
        let mut sel = Selection::new();
        sel.set_continuation_rect(Rect::new(1, 1, 5, 5), CombineMode::Replace);
        sel.commit_continuation();
        let saved = sel.save();
        sel.set_continuation_rect(Rect::new(0, 0, 50, 50), CombineMode::Union);
        sel.commit_continuation();
        sel.restore(&saved);
        assert_eq!(sel.data(), &saved);
        assert_eq!(sel.create_region().area(), 25);
    }

    #[test]
    fn test_region_clipped_to_clip_rect() {
        let mut sel = Selection::with_clip_rect(Rect::new(0, 0, 10, 10));
        sel.set_continuation_rect(Rect::new(-5, -5, 10, 10), CombineMode::Replace);
        assert_eq!(sel.create_region(), Region::from_rect(Rect::new(0, 0, 5, 5)));
        assert_eq!(sel.create_region_raw().area(), 100);
    }

    #[test]
    fn test_pixelated_path_of_ellipse_follows_pixels() {
        let mut sel = Selection::new();
        sel.set_continuation_ellipse(RectF::new(0.0, 0.0, 20.0, 20.0), CombineMode::Replace);
        let pixelated = sel.create_pixelated_path();
        assert_eq!(pixelated.region(), sel.create_path().region());
        for fig in pixelated.figures() {
            assert!(fig.iter().all(|p| p.x.fract() == 0.0 && p.y.fract() == 0.0));
        }
    }

    #[test]
    fn test_unsubscribe() {
        let mut sel = Selection::new();
        let events = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&events);
        let id = sel.subscribe(move |_| *sink.lock().unwrap() += 1);
        sel.reset();
        assert!(sel.unsubscribe(id));
        sel.reset();
        assert_eq!(*events.lock().unwrap(), 2);
    }
}
