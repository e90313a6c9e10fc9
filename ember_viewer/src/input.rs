
// System for quickly polling inputs per frame.

use winit::event::*;

use crate::em;

pub enum Key
{
    R = 0,  // NOTE: Do not change this.
    ESCAPE,
    LSHIFT,

    NumValues,
}

impl<T> std::ops::Index<Key> for [T; Key::NumValues as usize]
{
    type Output = T;
    fn index(&self, idx: Key) -> &Self::Output
    {
        return &self[idx as usize];
    }
}
impl<T> std::ops::IndexMut<Key> for [T; Key::NumValues as usize]
{
    fn index_mut(&mut self, idx: Key) -> &mut Self::Output
    {
        return &mut self[idx as usize];
    }
}

#[derive(Default, Clone, Copy)]
pub struct Input
{
    pub lmouse: ButtonState,
    pub rmouse: ButtonState,
    pub mmouse: ButtonState,
    pub keys: [ButtonState; Key::NumValues as usize],
    pub mouse_dx: f32,  // Pixels, right is positive
    pub mouse_dy: f32,  // Pixels, up is positive
    pub scroll: f32,    // Lines, away from the user is positive
}

// "Pressed" and "Released" will be active for a single frame.
// "Pressing" will always be true when "Pressed" is true,
// "Pressing" will always be false when "Released" is true
#[derive(Default, Clone, Copy)]
pub struct ButtonState
{
    pub pressed: bool,
    pub pressing: bool,
    pub released: bool
}

const PIXELS_PER_SCROLL_LINE: f32 = 40.0;

pub fn begin_input_events(input: &mut Input)
{
    // Zero out mouse delta
    input.mouse_dx = 0.0;
    input.mouse_dy = 0.0;
    input.scroll   = 0.0;

    // Zero out "one shot" booleans
    for button in [&mut input.lmouse, &mut input.rmouse, &mut input.mmouse]
    {
        button.pressed  = false;
        button.released = false;
    }
    for key in &mut input.keys
    {
        key.pressed  = false;
        key.released = false;
    }
}

fn press(button: &mut ButtonState)
{
    button.pressed  = true;
    button.pressing = true;
}

fn release(button: &mut ButtonState)
{
    button.pressing = false;
    button.released = true;
}

pub fn process_window_event(input: &mut Input, event: &WindowEvent)
{
    match event
    {
        WindowEvent::KeyboardInput { event, .. } =>
        'block: {
            if event.repeat { break 'block; }

            let action: fn(&mut ButtonState) = match event.state
            {
                ElementState::Pressed  => press,
                ElementState::Released => release,
            };

            use winit::keyboard::Key::Character;
            use winit::keyboard::Key::Named;
            use winit::keyboard::NamedKey;
            match &event.logical_key
            {
                Character(c) if c.eq_ignore_ascii_case("r") => { action(&mut input.keys[Key::R]); }
                Named(k) if *k == NamedKey::Escape => { action(&mut input.keys[Key::ESCAPE]); }
                Named(k) if *k == NamedKey::Shift  => { action(&mut input.keys[Key::LSHIFT]); }
                _ => (),
            }
        },
        WindowEvent::MouseInput { state, button, .. } =>
        {
            let action: fn(&mut ButtonState) = match state
            {
                ElementState::Pressed  => press,
                ElementState::Released => release,
            };

            match button
            {
                MouseButton::Left   => { action(&mut input.lmouse); }
                MouseButton::Right  => { action(&mut input.rmouse); }
                MouseButton::Middle => { action(&mut input.mmouse); }
                _ => (),
            }
        },
        WindowEvent::MouseWheel { delta, .. } =>
        {
            input.scroll += match delta
            {
                MouseScrollDelta::LineDelta(_, y)  => *y,
                MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_SCROLL_LINE,
            };
        },
        // Releases are lost when the window is not focused.
        WindowEvent::Focused(false) =>
        {
            *input = Input::default();
        },
        _ => {}
    }
}

pub fn process_device_event(input: &mut Input, event: &DeviceEvent)
{
    if let DeviceEvent::MouseMotion { delta } = event
    {
        input.mouse_dx += delta.0 as f32;
        input.mouse_dy -= delta.1 as f32;  // In winit, up = negative.
    }
}

/// Left drag orbits, middle (or shift+left) drag pans, the wheel zooms.
pub fn camera_input(input: &Input, ui_wants_mouse: bool) -> em::CameraInput
{
    let shift = input.keys[Key::LSHIFT].pressing;
    let pan   = input.mmouse.pressing || (input.lmouse.pressing && shift);
    let orbit = input.lmouse.pressing && !pan;

    let mut res = em::CameraInput { scroll: input.scroll, ui_wants_mouse, ..Default::default() };
    if orbit
    {
        res.orbit_dx = input.mouse_dx;
        res.orbit_dy = -input.mouse_dy;
    }
    else if pan
    {
        res.pan_dx = input.mouse_dx;
        res.pan_dy = -input.mouse_dy;
    }

    return res;
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn dragging(lmouse: bool, mmouse: bool, shift: bool) -> Input
    {
        let mut input = Input { mouse_dx: 3.0, mouse_dy: 2.0, ..Default::default() };
        input.lmouse.pressing = lmouse;
        input.mmouse.pressing = mmouse;
        input.keys[Key::LSHIFT].pressing = shift;
        return input;
    }

    #[test]
    fn test_left_drag_orbits()
    {
        let res = camera_input(&dragging(true, false, false), false);
        assert_eq!((res.orbit_dx, res.orbit_dy), (3.0, -2.0));
        assert_eq!((res.pan_dx, res.pan_dy), (0.0, 0.0));
    }

    #[test]
    fn test_pan_bindings()
    {
        for input in [dragging(false, true, false), dragging(true, false, true)]
        {
            let res = camera_input(&input, false);
            assert_eq!((res.pan_dx, res.pan_dy), (3.0, -2.0));
            assert_eq!((res.orbit_dx, res.orbit_dy), (0.0, 0.0));
        }
    }

    #[test]
    fn test_motion_without_buttons_is_ignored()
    {
        let mut input = dragging(false, false, false);
        input.scroll = 1.5;
        let res = camera_input(&input, true);
        assert_eq!(res, em::CameraInput { scroll: 1.5, ui_wants_mouse: true, ..Default::default() });
    }

    #[test]
    fn test_one_shot_flags_reset()
    {
        let mut input = Input::default();
        press(&mut input.lmouse);
        input.scroll = 2.0;
        begin_input_events(&mut input);
        assert!(!input.lmouse.pressed);
        assert!(input.lmouse.pressing);
        assert_eq!(input.scroll, 0.0);
    }
}
